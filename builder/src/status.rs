// Licensed under the Apache-2.0 license

use std::rc::Rc;

/// Receives human-readable progress messages.
pub trait StatusSink {
    fn update(&self, message: &str);
}

impl<F: Fn(&str)> StatusSink for F {
    fn update(&self, message: &str) {
        self(message)
    }
}

/// Forwards status messages to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl StatusSink for LogSink {
    fn update(&self, message: &str) {
        log::info!("{}", message);
    }
}

/// Fans a message out to every registered sink, in registration order.
#[derive(Clone, Default)]
pub struct Status {
    sinks: Vec<Rc<dyn StatusSink>>,
}

impl Status {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_sink(&mut self, sink: Rc<dyn StatusSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Rc<dyn StatusSink>) -> Self {
        self.add_sink(sink);
        self
    }

    pub fn update(&self, message: &str) {
        for sink in &self.sinks {
            sink.update(message);
        }
    }
}
