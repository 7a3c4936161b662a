use std::io::{self, Write};
use std::sync::{Arc, Mutex};

/// Receiving end of the USART transmit hook.
/// Bytes go to an optional capture sink and, unless disabled, to stdout.
#[derive(Debug, Default)]
pub struct Uart {
    sink: Option<Arc<Mutex<Vec<u8>>>>,
    echo_stdout: bool,
}

impl Uart {
    pub fn new() -> Self {
        Self {
            sink: None,
            echo_stdout: true,
        }
    }

    pub fn set_sink(&mut self, sink: Option<Arc<Mutex<Vec<u8>>>>, echo_stdout: bool) {
        self.sink = sink;
        self.echo_stdout = echo_stdout;
    }

    /// Never blocks on the consumer: a poisoned sink is still written through.
    pub fn transmit(&mut self, value: u8) {
        if let Some(sink) = &self.sink {
            let mut guard = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            guard.push(value);
        }
        if self.echo_stdout {
            let mut out = io::stdout();
            let _ = out.write_all(&[value]);
            let _ = out.flush();
        }
    }

    /// Everything captured so far, lossily decoded.
    pub fn captured_text(&self) -> String {
        match &self.sink {
            Some(sink) => {
                let guard = sink.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
                String::from_utf8_lossy(&guard).into_owned()
            }
            None => String::new(),
        }
    }
}
