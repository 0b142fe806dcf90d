use std::cell::RefCell;
use std::io;

use crate::exec::{CommandOutput, CommandRunner, Invocation};

type Responder = Box<dyn Fn(&Invocation) -> io::Result<CommandOutput>>;

pub struct ScriptedRunner {
    calls: RefCell<Vec<Invocation>>,
    responder: Responder,
}

impl ScriptedRunner {
    pub fn new(responder: impl Fn(&Invocation) -> io::Result<CommandOutput> + 'static) -> Self {
        Self {
            calls: RefCell::new(Vec::new()),
            responder: Box::new(responder),
        }
    }

    pub fn succeeding() -> Self {
        Self::new(|_| Ok(CommandOutput::ok("")))
    }

    pub fn calls(&self) -> Vec<Invocation> {
        self.calls.borrow().clone()
    }

    pub fn programs(&self) -> Vec<String> {
        self.calls.borrow().iter().map(|c| c.program.clone()).collect()
    }
}

impl CommandRunner for ScriptedRunner {
    fn output(&self, invocation: &Invocation) -> io::Result<CommandOutput> {
        self.calls.borrow_mut().push(invocation.clone());
        (self.responder)(invocation)
    }

    fn status(&self, invocation: &Invocation) -> io::Result<Option<i32>> {
        self.output(invocation).map(|out| out.code)
    }
}

impl CommandOutput {
    pub fn ok(stdout: &str) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.to_string(),
            stderr: String::new(),
        }
    }

    pub fn failed(code: i32, stderr: &str) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.to_string(),
        }
    }
}
