//! In-memory modem for integration tests.
//!
//! The modem records everything written to it and answers commands from a
//! script: each rule maps a command to the lines the modem sends back.
//! Replies are fed into the framer synchronously, as if the UART interrupt
//! had fired while the command was being written.

#![allow(dead_code)]

use std::cell::RefCell;
use std::convert::Infallible;
use std::rc::Rc;

use embassy_sync::mutex::Mutex;
use embassy_time::Duration;
use myrtio_at_mqtt::{
    AtClient, ConnectionOptions, EndpointOptions, ModemTransport, SerialFramer, SharedClient,
};

struct Rule {
    prefix: String,
    replies: Vec<String>,
    uses_left: Option<usize>,
}

#[derive(Default)]
struct State {
    rules: Vec<Rule>,
    partial: Vec<u8>,
    lines: Vec<String>,
    raw: Vec<Vec<u8>>,
    raw_expected: Option<usize>,
    bytes_written: usize,
}

/// Handle for scripting the modem and inspecting what it received.
#[derive(Clone, Default)]
pub struct Script(Rc<RefCell<State>>);

impl Script {
    /// Answer every matching command.
    pub fn on(&self, prefix: &str, replies: &[&str]) -> &Self {
        self.push_rule(prefix, replies, None)
    }

    /// Answer the next `times` matching commands.
    pub fn on_times(&self, prefix: &str, times: usize, replies: &[&str]) -> &Self {
        self.push_rule(prefix, replies, Some(times))
    }

    fn push_rule(&self, prefix: &str, replies: &[&str], uses_left: Option<usize>) -> &Self {
        self.0.borrow_mut().rules.push(Rule {
            prefix: prefix.to_owned(),
            replies: replies.iter().map(|r| (*r).to_owned()).collect(),
            uses_left,
        });
        self
    }

    /// Command lines written so far, terminators stripped.
    pub fn lines(&self) -> Vec<String> {
        self.0.borrow().lines.clone()
    }

    /// Raw payloads streamed after a `>` prompt.
    pub fn raw(&self) -> Vec<Vec<u8>> {
        self.0.borrow().raw.clone()
    }

    pub fn bytes_written(&self) -> usize {
        self.0.borrow().bytes_written
    }

    fn replies_for(&self, line: &str) -> Vec<String> {
        let mut state = self.0.borrow_mut();
        for rule in state.rules.iter_mut() {
            if !command_matches(&rule.prefix, line) || rule.uses_left == Some(0) {
                continue;
            }
            if let Some(uses) = rule.uses_left.as_mut() {
                *uses -= 1;
            }
            return rule.replies.clone();
        }
        Vec::new()
    }
}

/// A rule without `=` names a whole command (`AT` does not match `AT+RST`);
/// a rule with `=` matches any line starting with it.
fn command_matches(rule: &str, line: &str) -> bool {
    if rule.contains('=') {
        return line.starts_with(rule);
    }
    match line.split_once('=') {
        Some((name, _)) => name == rule,
        None => line == rule,
    }
}

fn raw_length(line: &str) -> Option<usize> {
    let header = line.strip_prefix("AT+MQTTPUBRAW=")?;
    let mut fields = header.rsplit(',');
    fields.next()?;
    fields.next()?;
    fields.next()?.parse().ok()
}

/// Transport half of the fake modem.
pub struct ScriptedModem {
    framer: &'static SerialFramer,
    script: Script,
}

impl ScriptedModem {
    fn reply(&self, replies: Vec<String>) {
        for reply in replies {
            self.framer.on_bytes(reply.as_bytes());
            if reply != ">" {
                self.framer.on_bytes(b"\r\n");
            }
        }
    }
}

impl ModemTransport for ScriptedModem {
    type Error = Infallible;

    async fn write(&mut self, buf: &[u8]) -> Result<(), Infallible> {
        let mut replies = Vec::new();
        {
            let mut state = self.script.0.borrow_mut();
            state.bytes_written += buf.len();

            if let Some(expected) = state.raw_expected {
                state.partial.extend_from_slice(buf);
                if state.partial.len() >= expected {
                    let data = std::mem::take(&mut state.partial);
                    state.raw.push(data);
                    state.raw_expected = None;
                    replies.push("+MQTTPUB:OK".to_owned());
                }
            } else {
                state.partial.extend_from_slice(buf);
                while let Some(end) = state.partial.windows(2).position(|w| w == b"\r\n") {
                    let line: Vec<u8> = state.partial.drain(..end + 2).collect();
                    let line = String::from_utf8_lossy(&line[..end]).into_owned();
                    state.lines.push(line.clone());
                    if let Some(len) = raw_length(&line) {
                        state.raw_expected = Some(len);
                    }
                    drop(state);
                    replies.extend(self.script.replies_for(&line));
                    state = self.script.0.borrow_mut();
                }
            }
        }
        self.reply(replies);
        Ok(())
    }
}

pub type TestClient = SharedClient<'static, ScriptedModem>;

/// A framer and a client wired to a fresh scripted modem, leaked so tests
/// can hand out `'static` references the way firmware does with statics.
pub fn rig() -> (&'static SerialFramer, &'static TestClient, Script) {
    let framer: &'static SerialFramer = Box::leak(Box::new(SerialFramer::new()));
    let script = Script::default();
    let modem = ScriptedModem {
        framer,
        script: script.clone(),
    };
    let client: &'static TestClient = Box::leak(Box::new(Mutex::new(AtClient::new(modem, framer))));
    (framer, client, script)
}

pub fn leak<T>(value: T) -> &'static T {
    Box::leak(Box::new(value))
}

pub fn fast_connection() -> ConnectionOptions {
    ConnectionOptions::default()
        .with_probe_timeout(Duration::from_millis(20))
        .with_probe_retry_delay(Duration::from_millis(5))
        .with_reset_settle(Duration::from_millis(1))
        .with_config_timeout(Duration::from_millis(20))
        .with_join_timeout(Duration::from_millis(50))
        .with_leave_timeout(Duration::from_millis(50))
        .with_broker_timeout(Duration::from_millis(50))
}

pub fn fast_endpoint() -> EndpointOptions {
    EndpointOptions::default().with_command_timeout(Duration::from_millis(50))
}
