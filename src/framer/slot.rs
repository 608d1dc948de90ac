//! Single-slot command/response correlation.
//!
//! The slot is written from two contexts: the task that issues a command arms
//! it and later collects the answer, the receive path offers every unclaimed
//! line to it. State lives behind a critical-section mutex so the receive
//! path may run in an interrupt; the wake-up goes through a [`Signal`]
//! carrying the generation of the command that was resolved.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::Mutex;
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use heapless::String;

use crate::config::{LINE_CAPACITY, MAX_EXPECTED_LEN};

/// Response payload captured after the expected prefix.
pub type Response = String<LINE_CAPACITY>;

/// Why a command could not be armed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ArmError {
    /// A command is still waiting for its response.
    Busy,
    /// The expected prefix does not fit into the slot.
    PrefixTooLong,
}

#[derive(Debug)]
enum Progress {
    Waiting,
    Arrived(Response),
}

#[derive(Debug)]
struct Pending {
    generation: u32,
    expected: String<MAX_EXPECTED_LEN>,
    progress: Progress,
}

struct State {
    generation: u32,
    pending: Option<Pending>,
}

/// The in-flight command slot.
pub struct CommandSlot {
    state: Mutex<CriticalSectionRawMutex, RefCell<State>>,
    arrived: Signal<CriticalSectionRawMutex, u32>,
}

impl CommandSlot {
    pub const fn new() -> Self {
        Self {
            state: Mutex::new(RefCell::new(State {
                generation: 0,
                pending: None,
            })),
            arrived: Signal::new(),
        }
    }

    /// Install a new pending command expecting a line that starts with
    /// `expected`. Returns the generation tag of the new command.
    ///
    /// A resolved or abandoned command is replaced; a command that is still
    /// waiting is not.
    pub fn arm(&self, expected: &str) -> Result<u32, ArmError> {
        let mut prefix = String::new();
        prefix
            .push_str(expected)
            .map_err(|_| ArmError::PrefixTooLong)?;

        let generation = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if matches!(
                state.pending,
                Some(Pending {
                    progress: Progress::Waiting,
                    ..
                })
            ) {
                return Err(ArmError::Busy);
            }
            state.generation = state.generation.wrapping_add(1);
            let generation = state.generation;
            state.pending = Some(Pending {
                generation,
                expected: prefix,
                progress: Progress::Waiting,
            });
            Ok(generation)
        })?;

        // A resolution of an older generation may still be parked here.
        self.arrived.reset();
        Ok(generation)
    }

    /// Offer a line from the receive path. Returns `true` if it resolved the
    /// waiting command.
    pub fn offer(&self, line: &str) -> bool {
        let resolved = self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            let Some(pending) = state.pending.as_mut() else {
                return None;
            };
            if !matches!(pending.progress, Progress::Waiting) {
                return None;
            }
            let rest = line.strip_prefix(pending.expected.as_str())?;
            let mut payload = Response::new();
            // `rest` is a suffix of a line, it always fits.
            let _ = payload.push_str(rest);
            pending.progress = Progress::Arrived(payload);
            Some(pending.generation)
        });

        match resolved {
            Some(generation) => {
                self.arrived.signal(generation);
                true
            }
            None => false,
        }
    }

    /// Wait until the command tagged `generation` is resolved and take its
    /// payload. Wake-ups for other generations are skipped.
    pub async fn wait(&self, generation: u32) -> Response {
        loop {
            // Checked before every wait: `arm` resets the signal, which can
            // swallow a resolution that landed right after installation.
            if let Some(payload) = self.take(generation) {
                return payload;
            }
            let woken_for = self.arrived.wait().await;
            if woken_for != generation {
                trace!("slot: ignoring stale wake-up for #{}", woken_for);
            }
        }
    }

    /// Take the payload of a resolved command, clearing the slot.
    pub fn take(&self, generation: u32) -> Option<Response> {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            match state.pending.take() {
                Some(Pending {
                    generation: g,
                    progress: Progress::Arrived(payload),
                    ..
                }) if g == generation => Some(payload),
                other => {
                    state.pending = other;
                    None
                }
            }
        })
    }

    /// Give up on the command tagged `generation`. A response arriving later
    /// finds no pending command and is discarded.
    pub fn abandon(&self, generation: u32) {
        self.state.lock(|cell| {
            let mut state = cell.borrow_mut();
            if state
                .pending
                .as_ref()
                .is_some_and(|p| p.generation == generation)
            {
                state.pending = None;
            }
        });
    }

    /// Returns `true` while a command waits for its response.
    pub fn is_waiting(&self) -> bool {
        self.state.lock(|cell| {
            matches!(
                cell.borrow().pending,
                Some(Pending {
                    progress: Progress::Waiting,
                    ..
                })
            )
        })
    }

    /// Generation of the most recently armed command.
    pub fn generation(&self) -> u32 {
        self.state.lock(|cell| cell.borrow().generation)
    }
}

impl Default for CommandSlot {
    fn default() -> Self {
        Self::new()
    }
}

/// Abandons the slot when the waiting future is dropped or times out.
pub(crate) struct AbandonOnDrop<'a> {
    pub(crate) slot: &'a CommandSlot,
    pub(crate) generation: u32,
}

impl Drop for AbandonOnDrop<'_> {
    fn drop(&mut self) {
        self.slot.abandon(self.generation);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matching_line_resolves_with_suffix() {
        let slot = CommandSlot::new();
        let generation = slot.arm("+CWJAP:").unwrap();
        assert!(!slot.offer("WIFI CONNECTED"));
        assert!(slot.offer("+CWJAP:\"home\",1"));
        assert_eq!(slot.take(generation).unwrap().as_str(), "\"home\",1");
        assert!(!slot.is_waiting());
    }

    #[test]
    fn exact_prefix_gives_empty_payload() {
        let slot = CommandSlot::new();
        let generation = slot.arm("OK").unwrap();
        assert!(slot.offer("OK"));
        assert_eq!(slot.take(generation).unwrap().as_str(), "");
    }

    #[test]
    fn offer_without_pending_command_changes_nothing() {
        let slot = CommandSlot::new();
        assert!(!slot.offer("OK"));
        assert!(!slot.is_waiting());
        assert_eq!(slot.generation(), 0);
    }

    #[test]
    fn second_arm_while_waiting_is_rejected() {
        let slot = CommandSlot::new();
        let first = slot.arm("OK").unwrap();
        assert_eq!(slot.arm("OK"), Err(ArmError::Busy));
        slot.abandon(first);
        assert!(slot.arm("OK").is_ok());
    }

    #[test]
    fn resolved_slot_can_be_rearmed() {
        let slot = CommandSlot::new();
        let first = slot.arm("OK").unwrap();
        assert!(slot.offer("OK"));
        let second = slot.arm("ready").unwrap();
        assert_ne!(first, second);
        // The stale answer of the first command is gone.
        assert!(slot.take(first).is_none());
        assert!(slot.is_waiting());
    }

    #[test]
    fn late_response_after_abandon_is_discarded() {
        let slot = CommandSlot::new();
        let generation = slot.arm("OK").unwrap();
        slot.abandon(generation);
        assert!(!slot.offer("OK"));
        assert!(slot.take(generation).is_none());
    }

    #[test]
    fn resolved_command_ignores_further_matches() {
        let slot = CommandSlot::new();
        let generation = slot.arm("OK").unwrap();
        assert!(slot.offer("OK first"));
        assert!(!slot.offer("OK second"));
        assert_eq!(slot.take(generation).unwrap().as_str(), " first");
    }

    #[test]
    fn prefix_longer_than_slot_is_rejected() {
        let slot = CommandSlot::new();
        let long = "x".repeat(MAX_EXPECTED_LEN + 1);
        assert_eq!(slot.arm(&long), Err(ArmError::PrefixTooLong));
    }
}
