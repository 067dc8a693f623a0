//! Debug console: single-character commands read from stdin.

use slpd_io::{Descriptor, DescriptorFuture};
use std::cell::RefCell;
use std::rc::Rc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info, warn};

/// Commands understood by the console.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleCommand {
    /// Dump the engine's store to the log
    Dump,
    /// Terminate the daemon
    Quit,
}

impl ConsoleCommand {
    /// Maps an input byte to a command; everything else is ignored.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            b'p' => Some(ConsoleCommand::Dump),
            b'q' => Some(ConsoleCommand::Quit),
            _ => None,
        }
    }
}

/// Handler invoked for each recognised command.
pub type CommandHandler = Box<dyn Fn(ConsoleCommand)>;

/// Reactor descriptor reading console commands from `R`.
///
/// End of input stops the reader; the daemon keeps running.
pub struct ConsoleReader<R> {
    input: RefCell<Option<R>>,
    handler: CommandHandler,
}

impl<R: AsyncRead + Unpin + 'static> ConsoleReader<R> {
    pub fn new(input: R, handler: CommandHandler) -> Self {
        Self {
            input: RefCell::new(Some(input)),
            handler,
        }
    }
}

impl<R: AsyncRead + Unpin + 'static> Descriptor for ConsoleReader<R> {
    fn describe(&self) -> String {
        "console".to_string()
    }

    fn serve(self: Rc<Self>) -> DescriptorFuture {
        Box::pin(async move {
            let Some(mut input) = self.input.borrow_mut().take() else {
                return;
            };

            let mut buffer = [0u8; 64];
            loop {
                match input.read(&mut buffer).await {
                    Ok(0) => {
                        debug!("Console input closed");
                        break;
                    }
                    Ok(n) => {
                        for command in buffer[..n].iter().copied().filter_map(ConsoleCommand::from_byte) {
                            info!(?command, "Console command");
                            (self.handler)(command);
                        }
                    }
                    Err(e) => {
                        warn!(error = %e, "Console read failed");
                        break;
                    }
                }
            }
        })
    }

    fn close(&self) {
        self.input.borrow_mut().take();
    }
}
