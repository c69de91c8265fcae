//! Test mock for `shell::run_host`.
//!
//! Installs a thread-local handler that intercepts host commands during
//! tests, so gateway code can be exercised without a multipass binary.

use std::cell::RefCell;
use std::os::unix::process::ExitStatusExt;
use std::process::{ExitStatus, Output};

/// Mock response for one host command.
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl MockResponse {
    pub fn ok(stdout: &str) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(stderr: &str) -> Self {
        Self {
            exit_code: 1,
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }

    fn to_output(&self) -> Output {
        Output {
            // Unix exit code encoding: status = code << 8
            status: ExitStatus::from_raw(self.exit_code << 8),
            stdout: self.stdout.as_bytes().to_vec(),
            stderr: self.stderr.as_bytes().to_vec(),
        }
    }
}

type MockHandler = Box<dyn Fn(&str, &[String]) -> MockResponse>;

thread_local! {
    static HANDLER: RefCell<Option<MockHandler>> = const { RefCell::new(None) };
}

/// Guard that clears the mock handler on drop.
pub struct MockGuard;

impl Drop for MockGuard {
    fn drop(&mut self) {
        HANDLER.with(|h| *h.borrow_mut() = None);
    }
}

/// Install a handler for the current thread. Returns a guard that clears it.
pub fn install(handler: impl Fn(&str, &[String]) -> MockResponse + 'static) -> MockGuard {
    HANDLER.with(|h| *h.borrow_mut() = Some(Box::new(handler)));
    MockGuard
}

/// Try to intercept a host command via the installed mock handler.
pub fn intercept(program: &str, args: &[String]) -> Option<Output> {
    HANDLER.with(|h| h.borrow().as_ref().map(|f| f(program, args).to_output()))
}
