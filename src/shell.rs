//! Line-oriented access to the hwmon attributes of an attached fan.
//!
//! Reads one command per line and answers with one line:
//!
//! ```text
//! list                  published attributes and their modes
//! read <attr>           attribute value
//! write <attr> <value>  "ok" or an error
//! help
//! quit | exit
//! ```
//!
//! Input is read on its own thread and handed over through an `mpsc`
//! channel, so a raised stop flag ends the session even while no line is
//! coming in.

use std::io::{self, BufRead, Write};
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use log::debug;

use crate::ec::PortIo;
use crate::errors::FanControlError;
use crate::hwmon::{Attribute, HwmonAdapter, ATTRIBUTES};

const HELP: &str = "commands: list | read <attr> | write <attr> <value> | help | quit";

/// How often the stop flag is checked while waiting for input.
const STOP_POLL: Duration = Duration::from_millis(100);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    List,
    Read(Attribute),
    Write(Attribute, i64),
    Help,
    Quit,
}

impl FromStr for Command {
    type Err = FanControlError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let words: Vec<&str> = line.split_whitespace().collect();
        match words.as_slice() {
            ["list"] => Ok(Command::List),
            ["help"] => Ok(Command::Help),
            ["quit"] | ["exit"] => Ok(Command::Quit),
            ["read", name] => Ok(Command::Read(name.parse()?)),
            ["write", name, value] => {
                let attribute = name.parse()?;
                let value = value.parse::<i64>().map_err(|_| {
                    FanControlError::InvalidArgument(format!("'{}' is not an integer", value))
                })?;
                Ok(Command::Write(attribute, value))
            }
            _ => Err(FanControlError::InvalidArgument(format!(
                "cannot parse '{}' ({})",
                line.trim(),
                HELP
            ))),
        }
    }
}

/// Forward lines from `input` until EOF or until the receiver is gone.
///
/// The thread is not joined: a reader blocked on a terminal stays blocked
/// until the process exits.
fn spawn_reader<R>(input: R) -> mpsc::Receiver<io::Result<String>>
where
    R: BufRead + Send + 'static,
{
    let (line_tx, line_rx) = mpsc::channel();
    thread::spawn(move || {
        for line in input.lines() {
            if line_tx.send(line).is_err() {
                break;
            }
        }
    });
    line_rx
}

/// Serve commands from `input` until EOF, `quit`, or `stop` is raised.
pub fn run<P, R, W>(
    adapter: &HwmonAdapter<'_, P>,
    input: R,
    mut output: W,
    stop: &AtomicBool,
) -> io::Result<()>
where
    P: PortIo,
    R: BufRead + Send + 'static,
    W: Write,
{
    let line_rx = spawn_reader(input);
    loop {
        if stop.load(Ordering::Relaxed) {
            debug!("shell: stop requested");
            break;
        }
        let line = match line_rx.recv_timeout(STOP_POLL) {
            Ok(line) => line?,
            Err(mpsc::RecvTimeoutError::Timeout) => continue,
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        };
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        debug!("shell: {}", line);
        let command = match line.parse::<Command>() {
            Ok(command) => command,
            Err(error) => {
                writeln!(output, "error: {}", error)?;
                continue;
            }
        };

        match command {
            Command::Quit => break,
            Command::Help => writeln!(output, "{}", HELP)?,
            Command::List => {
                let listing: Vec<String> = ATTRIBUTES
                    .iter()
                    .map(|attribute| format!("{}:{:o}", attribute, adapter.is_visible(*attribute)))
                    .collect();
                writeln!(output, "{}", listing.join(" "))?;
            }
            Command::Read(attribute) => match adapter.read(attribute) {
                Ok(value) => writeln!(output, "{}", value)?,
                Err(error) => writeln!(output, "error: {}", error)?,
            },
            Command::Write(attribute, value) => match adapter.write(attribute, value) {
                Ok(()) => writeln!(output, "ok")?,
                Err(error) => writeln!(output, "error: {}", error)?,
            },
        }
        output.flush()?;
    }
    Ok(())
}
