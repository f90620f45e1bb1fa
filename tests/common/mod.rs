//! Scripted protocol-driver and reactor doubles for scenario tests
//!
//! The session completes handshakes and answers requests according to a
//! per-session script; the reactor delivers level-triggered readiness for
//! every registered interest and runs a virtual clock that jumps to the
//! earliest armed timer when no I/O interest remains (the way a real event
//! loop sleeps until its next timer).

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use wirepool::prelude::*;

/// Panic guard against runaway scenarios
pub const MAX_PUMPS: u64 = 10_000;

/// Connect target used by every scenario
pub fn target() -> &'static str {
    "db://app:secret@localhost/testdb"
}

// ==================== Session / Driver ====================

/// Per-session behavior script
#[derive(Debug, Default, Clone)]
pub struct SessionScript {
    /// Connect handshake steps, drained front to back; empty means Complete
    pub connect: Vec<HandshakePoll>,
    /// Reset handshake steps, drained front to back; empty means Complete
    pub reset: Vec<HandshakePoll>,
    /// start_reset returns false
    pub refuse_reset: bool,
    /// send is rejected
    pub fail_send: bool,
    /// consume_input is rejected
    pub fail_consume: bool,
    /// Flush results, drained front to back; empty means Drained
    pub flush: Vec<FlushPoll>,
    /// take_result withholds results until cleared
    pub hold_results: bool,
}

impl SessionScript {
    pub fn failing_send() -> Self {
        Self {
            fail_send: true,
            ..Default::default()
        }
    }

    pub fn failing_consume() -> Self {
        Self {
            fail_consume: true,
            ..Default::default()
        }
    }
}

/// Observable state of one scripted session
#[derive(Debug, Default)]
pub struct SessionState {
    pub script: SessionScript,
    /// Commands accepted by send, in order
    pub sent: Vec<String>,
    /// Command whose result has not been taken yet
    pub inflight: Option<String>,
    /// Input consumed since the last send
    pub consumed: bool,
    /// start_reset invocations
    pub resets: usize,
    /// Results delivered without a matching send
    pub spurious: VecDeque<ResultSet>,
}

pub type SharedSession = Rc<RefCell<SessionState>>;

/// Result echoing the command back, so tests can match request to response
pub fn echo_result(command: &str) -> ResultSet {
    ResultSet::new(
        vec!["command".into()],
        vec![Row::new(
            vec!["command".into()],
            vec![Value::String(command.to_string())],
        )],
    )
}

struct ScriptedSession {
    state: SharedSession,
}

impl Session for ScriptedSession {
    fn poll_connect(&mut self) -> HandshakePoll {
        let mut s = self.state.borrow_mut();
        if s.script.connect.is_empty() {
            HandshakePoll::Complete
        } else {
            s.script.connect.remove(0)
        }
    }

    fn start_reset(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        s.resets += 1;
        !s.script.refuse_reset
    }

    fn poll_reset(&mut self) -> HandshakePoll {
        let mut s = self.state.borrow_mut();
        if s.script.reset.is_empty() {
            HandshakePoll::Complete
        } else {
            s.script.reset.remove(0)
        }
    }

    fn is_busy(&self) -> bool {
        let s = self.state.borrow();
        s.inflight.is_some() && !s.consumed
    }

    fn send(&mut self, command: &str, _params: &[Value]) -> bool {
        let mut s = self.state.borrow_mut();
        if s.script.fail_send {
            return false;
        }
        s.sent.push(command.to_string());
        s.inflight = Some(command.to_string());
        s.consumed = false;
        true
    }

    fn flush(&mut self) -> FlushPoll {
        let mut s = self.state.borrow_mut();
        if s.script.flush.is_empty() {
            FlushPoll::Drained
        } else {
            s.script.flush.remove(0)
        }
    }

    fn consume_input(&mut self) -> bool {
        let mut s = self.state.borrow_mut();
        if s.script.fail_consume {
            return false;
        }
        s.consumed = true;
        true
    }

    fn take_result(&mut self) -> Option<ResultSet> {
        let mut s = self.state.borrow_mut();
        if let Some(result) = s.spurious.pop_front() {
            return Some(result);
        }
        if s.script.hold_results {
            return None;
        }
        if s.consumed {
            let command = s.inflight.take()?;
            return Some(echo_result(&command));
        }
        None
    }

    fn last_error(&self) -> Option<String> {
        let s = self.state.borrow();
        if s.script.fail_send || s.script.fail_consume {
            Some("scripted failure".into())
        } else {
            None
        }
    }
}

#[derive(Debug, Default)]
pub struct DriverState {
    /// Scripts consumed per start_connect; empty falls back to default
    pub scripts: VecDeque<SessionScript>,
    /// Sessions handed out, in creation order
    pub sessions: Vec<SharedSession>,
    /// Next N start_connect calls are refused
    pub fail_connects: usize,
    /// Total start_connect calls
    pub connects: usize,
}

/// Scripted driver; clone it to keep a handle after moving into the pool
#[derive(Clone, Default)]
pub struct ScriptedDriver {
    state: Rc<RefCell<DriverState>>,
}

impl ScriptedDriver {
    pub fn push_script(&self, script: SessionScript) {
        self.state.borrow_mut().scripts.push_back(script);
    }

    pub fn set_fail_connects(&self, n: usize) {
        self.state.borrow_mut().fail_connects = n;
    }

    pub fn connects(&self) -> usize {
        self.state.borrow().connects
    }

    pub fn session_count(&self) -> usize {
        self.state.borrow().sessions.len()
    }

    /// Session by creation order
    pub fn session(&self, index: usize) -> SharedSession {
        Rc::clone(&self.state.borrow().sessions[index])
    }

    /// Commands sent on a session, in order
    pub fn sent(&self, index: usize) -> Vec<String> {
        self.session(index).borrow().sent.clone()
    }
}

impl Driver for ScriptedDriver {
    fn start_connect(&self, _target: &str) -> wirepool::Result<Box<dyn Session>> {
        let mut state = self.state.borrow_mut();
        state.connects += 1;
        if state.fail_connects > 0 {
            state.fail_connects -= 1;
            return Err(Error::connect("scripted connect refusal"));
        }
        let script = state.scripts.pop_front().unwrap_or_default();
        let session = Rc::new(RefCell::new(SessionState {
            script,
            ..Default::default()
        }));
        state.sessions.push(Rc::clone(&session));
        Ok(Box::new(ScriptedSession {
            state: Rc::clone(&session),
        }))
    }
}

// ==================== Reactor ====================

#[derive(Debug, Default)]
pub struct ReactorState {
    pub registrations: BTreeMap<usize, Interest>,
    pub register_calls: u64,
    pub deregister_calls: u64,
    /// (token, deadline) in virtual milliseconds, arm order
    pub timers: Vec<(usize, u64)>,
    pub now_ms: u64,
    pub pumps: u64,
}

/// Scripted reactor; clone it to keep a handle after moving into the pool
#[derive(Clone, Default)]
pub struct ScriptedReactor {
    state: Rc<RefCell<ReactorState>>,
}

impl ScriptedReactor {
    pub fn register_calls(&self) -> u64 {
        self.state.borrow().register_calls
    }

    pub fn deregister_calls(&self) -> u64 {
        self.state.borrow().deregister_calls
    }

    pub fn now_ms(&self) -> u64 {
        self.state.borrow().now_ms
    }

    pub fn interest_of(&self, token: usize) -> Option<Interest> {
        self.state.borrow().registrations.get(&token).copied()
    }

    pub fn timers(&self) -> Vec<(usize, u64)> {
        self.state.borrow().timers.clone()
    }
}

impl Reactor for ScriptedReactor {
    fn register(&mut self, token: Token, interest: Interest) {
        let mut s = self.state.borrow_mut();
        s.register_calls += 1;
        s.registrations.insert(token.0, interest);
    }

    fn deregister(&mut self, token: Token) {
        let mut s = self.state.borrow_mut();
        s.deregister_calls += 1;
        s.registrations.remove(&token.0);
    }

    fn arm_timer(&mut self, token: Token, delay: Duration) {
        let mut s = self.state.borrow_mut();
        let deadline = s.now_ms + delay.as_millis() as u64;
        s.timers.retain(|&(t, _)| t != token.0);
        s.timers.push((token.0, deadline));
    }

    fn disarm_timer(&mut self, token: Token) {
        let mut s = self.state.borrow_mut();
        s.timers.retain(|&(t, _)| t != token.0);
    }

    fn run_once(&mut self, events: &mut Vec<Event>) -> bool {
        let mut s = self.state.borrow_mut();
        s.pumps += 1;
        assert!(
            s.pumps <= MAX_PUMPS,
            "scripted reactor exceeded its pump budget (runaway scenario?)"
        );
        s.now_ms += 1;

        // Level-triggered: every registered interest is ready every pump.
        for (&token, &interest) in s.registrations.iter() {
            if !interest.is_empty() {
                events.push(Event::io(Token(token), interest));
            }
        }

        // Timers that have come due fire after the I/O events.
        let now = s.now_ms;
        let mut fired = Vec::new();
        s.timers.retain(|&(token, deadline)| {
            if deadline <= now {
                fired.push(token);
                false
            } else {
                true
            }
        });

        if events.is_empty() && fired.is_empty() {
            // Idle: sleep until the earliest armed timer, as a real event
            // loop would.
            let earliest = s
                .timers
                .iter()
                .enumerate()
                .min_by_key(|(_, &(_, deadline))| deadline)
                .map(|(index, _)| index);
            match earliest {
                Some(index) => {
                    let (token, deadline) = s.timers.remove(index);
                    s.now_ms = deadline;
                    events.push(Event::timer(Token(token)));
                    true
                }
                None => false,
            }
        } else {
            for token in fired {
                events.push(Event::timer(Token(token)));
            }
            true
        }
    }
}

// ==================== Scenario helpers ====================

/// Build a pool with per-slot session scripts and handles to the doubles
pub fn new_pool(
    config: PoolConfig,
    scripts: Vec<SessionScript>,
) -> (Pool, ScriptedReactor, ScriptedDriver) {
    let reactor = ScriptedReactor::default();
    let driver = ScriptedDriver::default();
    for script in scripts {
        driver.push_script(script);
    }
    let pool = Pool::new(reactor.clone(), driver.clone(), config).expect("pool creation");
    (pool, reactor, driver)
}

/// Records completion outcomes in invocation order
#[derive(Clone, Default)]
pub struct Recorder {
    log: Rc<RefCell<Vec<(String, Outcome)>>>,
}

impl Recorder {
    /// A completion handler that records under `tag`
    pub fn completion(&self, tag: &str) -> impl FnOnce(Outcome) + 'static {
        let log = Rc::clone(&self.log);
        let tag = tag.to_string();
        move |outcome| log.borrow_mut().push((tag, outcome))
    }

    pub fn len(&self) -> usize {
        self.log.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.log.borrow().is_empty()
    }

    /// Tags in completion order
    pub fn tags(&self) -> Vec<String> {
        self.log.borrow().iter().map(|(t, _)| t.clone()).collect()
    }

    pub fn is_success(&self, index: usize) -> bool {
        self.log.borrow()[index].1.is_success()
    }

    pub fn error_category(&self, index: usize) -> Option<ErrorCategory> {
        match &self.log.borrow()[index].1 {
            Outcome::Failure(err) => Some(err.category()),
            Outcome::Success(_) => None,
        }
    }

    /// The echoed command of a successful outcome
    pub fn echoed_command(&self, index: usize) -> Option<String> {
        match &self.log.borrow()[index].1 {
            Outcome::Success(rs) => rs
                .first()
                .and_then(|row| row.get_by_name("command"))
                .and_then(|v| v.as_str().map(str::to_string)),
            Outcome::Failure(_) => None,
        }
    }
}
