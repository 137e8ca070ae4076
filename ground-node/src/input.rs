//! Input-device seam
//!
//! The physical gamepad driver and the thrust mixing live outside the node.
//! The command dispatch loop only sees:
//!
//! - [`ControllerProvider`]: finds a controller, or reports none present
//! - [`Gamepad`]: yields [`InputEvent`]s with a bounded wait
//! - [`ThrustMixer`]: folds events into controller state and derives the
//!   motor-thrust vector
//!
//! [`ChannelGamepad`] is fed from a `crossbeam-channel`, which the console
//! trigger and the tests use to inject events. [`AxisMixer`] is a minimal
//! mixer mapping one axis per motor.

use crate::error::{Error, Result};
use crate::settings::Settings;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::time::Duration;

/// Kind of input event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// Button press (1) or release (0)
    Key,
    /// Absolute axis position
    Axis,
}

/// One event from the input device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputEvent {
    pub kind: EventKind,
    pub code: u16,
    pub value: i32,
}

impl InputEvent {
    pub fn key(code: u16, pressed: bool) -> Self {
        Self {
            kind: EventKind::Key,
            code,
            value: i32::from(pressed),
        }
    }

    pub fn axis(code: u16, value: i32) -> Self {
        Self {
            kind: EventKind::Axis,
            code,
            value,
        }
    }

    /// Whether this is a press of the designated stop button
    pub fn is_stop(&self, stop_code: u16) -> bool {
        self.kind == EventKind::Key && self.code == stop_code && self.value == 1
    }
}

/// Parses `key <code> <0|1>` or `axis <code> <value>`
impl FromStr for InputEvent {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        let [kind, code, value] = parts.as_slice() else {
            return Err(Error::Other(format!("Expected '<key|axis> <code> <value>': {}", s)));
        };
        let code: u16 = code
            .parse()
            .map_err(|_| Error::Other(format!("Invalid event code: {}", code)))?;
        let value: i32 = value
            .parse()
            .map_err(|_| Error::Other(format!("Invalid event value: {}", value)))?;
        let kind = match *kind {
            "key" => EventKind::Key,
            "axis" => EventKind::Axis,
            other => return Err(Error::Other(format!("Unknown event kind: {}", other))),
        };
        Ok(Self { kind, code, value })
    }
}

/// A connected controller
pub trait Gamepad: Send {
    /// Wait up to `timeout` for the next event
    ///
    /// `Ok(None)` means no event arrived in time.
    fn read_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>>;

    /// Device name for logs
    fn name(&self) -> &str;
}

/// Source of controllers
pub trait ControllerProvider: Send {
    /// Look for a controller; `None` when none is attached
    fn identify(&mut self) -> Option<Box<dyn Gamepad>>;
}

/// Controller state and thrust derivation
pub trait ThrustMixer: Send {
    /// Fold one event into the controller state
    fn process_event(&mut self, event: &InputEvent);

    /// Motor-thrust vector for the current state
    fn thrust(&self, settings: &Settings) -> Vec<f64>;
}

/// Gamepad fed by a channel of events
///
/// Once every sender is gone the pad reports no events, waiting out each
/// read timeout.
pub struct ChannelGamepad {
    name: String,
    events: Receiver<InputEvent>,
}

impl ChannelGamepad {
    pub fn new(name: impl Into<String>, events: Receiver<InputEvent>) -> Self {
        Self {
            name: name.into(),
            events,
        }
    }

    /// Gamepad plus the sender used to inject events
    pub fn pair(name: impl Into<String>) -> (Sender<InputEvent>, Self) {
        let (tx, rx) = crossbeam_channel::unbounded();
        (tx, Self::new(name, rx))
    }
}

impl Gamepad for ChannelGamepad {
    fn read_event(&mut self, timeout: Duration) -> Result<Option<InputEvent>> {
        match self.events.recv_timeout(timeout) {
            Ok(event) => Ok(Some(event)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            // Closed feed: no more input, but the pad stays usable for polling
            Err(RecvTimeoutError::Disconnected) => {
                std::thread::sleep(timeout);
                Ok(None)
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Provider handing out one pre-built gamepad
pub struct SingleController {
    pad: Option<Box<dyn Gamepad>>,
}

impl SingleController {
    pub fn new(pad: impl Gamepad + 'static) -> Self {
        Self {
            pad: Some(Box::new(pad)),
        }
    }

    /// Provider that never finds a controller
    pub fn none() -> Self {
        Self { pad: None }
    }
}

impl ControllerProvider for SingleController {
    fn identify(&mut self) -> Option<Box<dyn Gamepad>> {
        self.pad.take()
    }
}

/// Full-scale absolute axis value
const AXIS_FULL_SCALE: f64 = 32767.0;

/// Mixer that drives motor `i` from the `i`-th axis seen, in code order
#[derive(Debug, Default)]
pub struct AxisMixer {
    axes: BTreeMap<u16, f64>,
}

impl AxisMixer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ThrustMixer for AxisMixer {
    fn process_event(&mut self, event: &InputEvent) {
        if event.kind == EventKind::Axis {
            let normalized = (f64::from(event.value) / AXIS_FULL_SCALE).clamp(-1.0, 1.0);
            self.axes.insert(event.code, normalized);
        }
    }

    fn thrust(&self, settings: &Settings) -> Vec<f64> {
        let mut axes = self.axes.values();
        (0..settings.num_motors)
            .map(|i| {
                let flip = settings.flip_motors.get(i).copied().unwrap_or(1);
                axes.next().copied().unwrap_or(0.0) * f64::from(flip)
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_parse_events() {
        assert_eq!(
            "key 315 1".parse::<InputEvent>().unwrap(),
            InputEvent::key(315, true)
        );
        assert_eq!(
            "  axis 1 -32767 ".parse::<InputEvent>().unwrap(),
            InputEvent::axis(1, -32767)
        );
        assert!("axis 1".parse::<InputEvent>().is_err());
        assert!("wheel 1 2".parse::<InputEvent>().is_err());
        assert!("key x 1".parse::<InputEvent>().is_err());
    }

    #[test]
    fn test_stop_code_only_on_press() {
        assert!(InputEvent::key(315, true).is_stop(315));
        assert!(!InputEvent::key(315, false).is_stop(315));
        assert!(!InputEvent::key(304, true).is_stop(315));
        assert!(!InputEvent::axis(315, 1).is_stop(315));
    }

    #[test]
    fn test_channel_gamepad() {
        let (tx, mut pad) = ChannelGamepad::pair("test pad");
        assert_eq!(pad.name(), "test pad");
        assert_eq!(pad.read_event(Duration::from_millis(10)).unwrap(), None);

        tx.send(InputEvent::axis(0, 5)).unwrap();
        assert_eq!(
            pad.read_event(Duration::from_millis(10)).unwrap(),
            Some(InputEvent::axis(0, 5))
        );

        drop(tx);
        assert_eq!(pad.read_event(Duration::from_millis(10)).unwrap(), None);
    }

    #[test]
    fn test_single_controller_hands_out_once() {
        let (_tx, pad) = ChannelGamepad::pair("pad");
        let mut provider = SingleController::new(pad);
        assert!(provider.identify().is_some());
        assert!(provider.identify().is_none());
        assert!(SingleController::none().identify().is_none());
    }

    #[test]
    fn test_axis_mixer() {
        let mut settings = Settings::default();
        settings.num_motors = 3;
        settings.flip_motors = vec![1, -1, 1];

        let mut mixer = AxisMixer::new();
        assert_eq!(mixer.thrust(&settings), vec![0.0; 3]);

        mixer.process_event(&InputEvent::axis(5, 32767));
        mixer.process_event(&InputEvent::axis(1, 16384));
        mixer.process_event(&InputEvent::key(304, true));

        let thrust = mixer.thrust(&settings);
        assert_eq!(thrust.len(), 3);
        assert_relative_eq!(thrust[0], 16384.0 / 32767.0);
        assert_relative_eq!(thrust[1], -1.0);
        assert_relative_eq!(thrust[2], 0.0);
    }

    #[test]
    fn test_axis_mixer_clamps() {
        let mut mixer = AxisMixer::new();
        mixer.process_event(&InputEvent::axis(0, -40000));
        let thrust = mixer.thrust(&Settings::default());
        assert_relative_eq!(thrust[0], -1.0);
        assert_eq!(thrust.len(), 6);
    }
}
