//! Stdin handler doubles and a gate for holding handlers mid-call.

use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::time::Duration;

use anyhow::anyhow;
use kiln_protocol::ForwardInput;

use super::wait_until;
use crate::StdinHandler;

const GATE_TIMEOUT: Duration = Duration::from_secs(5);

/// What a stdin handler observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivered {
    Input(Vec<u8>),
    EndOfInput,
}

impl Delivered {
    pub fn input(bytes: &[u8]) -> Self {
        Self::Input(bytes.to_vec())
    }
}

/// Shared record of deliveries made to a handler.
#[derive(Clone, Default)]
pub struct StdinLog(Arc<Mutex<Vec<Delivered>>>);

impl StdinLog {
    pub fn push(&self, delivered: Delivered) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(delivered);
    }

    pub fn snapshot(&self) -> Vec<Delivered> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn wait_for_len(&self, len: usize) -> bool {
        wait_until(|| self.snapshot().len() >= len)
    }
}

/// Handler that records every call.
pub struct RecordingStdin {
    log: StdinLog,
}

impl RecordingStdin {
    pub fn boxed(log: &StdinLog) -> Box<dyn StdinHandler> {
        Box::new(Self { log: log.clone() })
    }
}

impl StdinHandler for RecordingStdin {
    fn on_input(&mut self, input: ForwardInput) -> anyhow::Result<()> {
        self.log.push(Delivered::Input(input.into_bytes()));
        Ok(())
    }

    fn on_end_of_input(&mut self) -> anyhow::Result<()> {
        self.log.push(Delivered::EndOfInput);
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum FailMode {
    Error,
    Panic,
}

/// Handler that records its first input and then fails.
pub struct FailingStdin {
    log: StdinLog,
    mode: FailMode,
}

impl FailingStdin {
    pub fn boxed(log: &StdinLog, mode: FailMode) -> Box<dyn StdinHandler> {
        Box::new(Self {
            log: log.clone(),
            mode,
        })
    }

    fn fail(&self) -> anyhow::Result<()> {
        match self.mode {
            FailMode::Error => Err(anyhow!("handler rejected input")),
            FailMode::Panic => panic!("handler exploded"),
        }
    }
}

impl StdinHandler for FailingStdin {
    fn on_input(&mut self, input: ForwardInput) -> anyhow::Result<()> {
        self.log.push(Delivered::Input(input.into_bytes()));
        self.fail()
    }

    fn on_end_of_input(&mut self) -> anyhow::Result<()> {
        self.log.push(Delivered::EndOfInput);
        self.fail()
    }
}

/// Handler that holds its first input call at a [`Gate`].
pub struct GatedStdin {
    log: StdinLog,
    gate: Gate,
}

impl GatedStdin {
    pub fn boxed(log: &StdinLog, gate: &Gate) -> Box<dyn StdinHandler> {
        Box::new(Self {
            log: log.clone(),
            gate: gate.clone(),
        })
    }
}

impl StdinHandler for GatedStdin {
    fn on_input(&mut self, input: ForwardInput) -> anyhow::Result<()> {
        self.gate.pass();
        self.log.push(Delivered::Input(input.into_bytes()));
        Ok(())
    }

    fn on_end_of_input(&mut self) -> anyhow::Result<()> {
        self.log.push(Delivered::EndOfInput);
        Ok(())
    }
}

#[derive(Default)]
struct GateState {
    entered: bool,
    open: bool,
}

/// Blocks a handler until the test opens it.
#[derive(Clone, Default)]
pub struct Gate(Arc<(Mutex<GateState>, Condvar)>);

impl Gate {
    /// Marks the gate as reached and waits for it to open.
    pub fn pass(&self) {
        let (state, changed) = &*self.0;
        let mut guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        guard.entered = true;
        changed.notify_all();
        let (guard, timeout) = changed
            .wait_timeout_while(guard, GATE_TIMEOUT, |gate| !gate.open)
            .unwrap_or_else(PoisonError::into_inner);
        drop(guard);
        assert!(!timeout.timed_out(), "gate was never opened");
    }

    pub fn open(&self) {
        let (state, changed) = &*self.0;
        state.lock().unwrap_or_else(PoisonError::into_inner).open = true;
        changed.notify_all();
    }

    pub fn wait_entered(&self) -> bool {
        let (state, changed) = &*self.0;
        let guard = state.lock().unwrap_or_else(PoisonError::into_inner);
        let (guard, _) = changed
            .wait_timeout_while(guard, GATE_TIMEOUT, |gate| !gate.entered)
            .unwrap_or_else(PoisonError::into_inner);
        guard.entered
    }
}
