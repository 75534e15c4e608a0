//! Interactive shell.
//!
//! The shell is the long-running host for the session controller: it feeds
//! timer events into it, polls it on a fixed interval and signals a resume
//! whenever the machine appears to have been asleep or the user comes back
//! with a new command. Notices raised by the controller are printed between
//! commands and while the prompt is idle.

use std::io::{self, BufRead, Write};
use std::sync::mpsc as std_mpsc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};
use clap::Parser;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use taskpad_core::SessionEvent;

use crate::app::App;
use crate::cli::{Cli, Command};
use crate::commands;

const PROMPT: &str = "taskpad> ";

/// One line of shell input, parsed.
#[derive(Debug)]
enum Input {
    Empty,
    Exit,
    Run(Command),
    /// Parse failure or help output, printed as-is
    Message(String),
}

fn parse_line(line: &str) -> Input {
    let line = line.trim();
    match line {
        "" => return Input::Empty,
        "exit" | "quit" => return Input::Exit,
        _ => {}
    }

    let words = match shell_words::split(line) {
        Ok(words) => words,
        Err(e) => return Input::Message(format!("Could not parse input: {}", e)),
    };

    match Cli::try_parse_from(std::iter::once("taskpad".to_string()).chain(words)) {
        Ok(Cli {
            command: Some(Command::Shell) | None,
        }) => Input::Message("Already in the shell".to_string()),
        Ok(Cli {
            command: Some(command),
        }) => Input::Run(command),
        Err(e) => Input::Message(e.render().to_string()),
    }
}

/// Tells a regular poll tick apart from one that follows a suspend.
///
/// The monotonic clock stops while the machine sleeps but the wall clock
/// does not, so a gap between the two means the process was frozen. A tick
/// that arrives far later than scheduled means the same thing for a stalled
/// event loop.
#[derive(Debug)]
struct ResumeDetector {
    interval: Duration,
    last_wall: DateTime<Utc>,
    last_mono: Instant,
}

impl ResumeDetector {
    fn new(interval: Duration, wall: DateTime<Utc>, mono: Instant) -> Self {
        Self {
            interval,
            last_wall: wall,
            last_mono: mono,
        }
    }

    fn tick(&mut self, wall: DateTime<Utc>, mono: Instant) -> SessionEvent {
        let mono_elapsed = mono.saturating_duration_since(self.last_mono);
        let wall_elapsed = wall - self.last_wall;
        self.last_wall = wall;
        self.last_mono = mono;

        let mono_chrono =
            chrono::Duration::from_std(mono_elapsed).unwrap_or(chrono::Duration::zero());
        let interval =
            chrono::Duration::from_std(self.interval).unwrap_or(chrono::Duration::zero());
        let drift = (wall_elapsed - mono_chrono).abs();

        if drift > interval || mono_elapsed > self.interval * 2 {
            debug!(
                wall_secs = wall_elapsed.num_seconds(),
                mono_secs = mono_elapsed.as_secs(),
                "Clock gap detected"
            );
            SessionEvent::Resume
        } else {
            SessionEvent::Poll
        }
    }
}

/// Reads stdin one line at a time, but only after the shell asks for the
/// next line. Prompts issued by commands (passwords, emails) read stdin
/// themselves in between.
fn spawn_reader() -> (std_mpsc::Sender<()>, mpsc::Receiver<String>) {
    let (ready_tx, ready_rx) = std_mpsc::channel::<()>();
    let (line_tx, line_rx) = mpsc::channel::<String>(1);

    thread::spawn(move || {
        let stdin = io::stdin();
        while ready_rx.recv().is_ok() {
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                // EOF or a broken stdin ends the shell
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if line_tx.blocking_send(line).is_err() {
                        break;
                    }
                }
            }
        }
    });

    (ready_tx, line_rx)
}

fn show_prompt() {
    print!("{}", PROMPT);
    let _ = io::stdout().flush();
}

/// Print pending notices. Returns true if anything was printed.
fn print_notices(app: &mut App) -> bool {
    let notices = app.drain_notices();
    for notice in &notices {
        println!("* {}", notice);
    }
    !notices.is_empty()
}

pub async fn run(app: &mut App) -> Result<()> {
    let mut events = app
        .take_events()
        .ok_or_else(|| anyhow!("Session events are already being consumed"))?;

    let poll_interval = app.session.timing().poll_interval;
    let mut ticker = tokio::time::interval(poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately
    ticker.tick().await;
    let mut detector = ResumeDetector::new(poll_interval, Utc::now(), Instant::now());

    let (ready, mut lines) = spawn_reader();

    info!("Shell started");
    println!("taskpad shell. Type `help` for commands, `exit` to leave.");
    commands::print_whoami(app);
    print_notices(app);
    show_prompt();
    if ready.send(()).is_err() {
        return Ok(());
    }

    loop {
        tokio::select! {
            Some(event) = events.recv() => {
                app.session.handle(event);
            }
            _ = ticker.tick() => {
                let event = detector.tick(Utc::now(), Instant::now());
                app.session.handle(event);
            }
            line = lines.recv() => {
                let Some(line) = line else {
                    println!();
                    break;
                };
                // Coming back to the prompt counts as a resume
                app.session.handle(SessionEvent::Resume);
                print_notices(app);

                match parse_line(&line) {
                    Input::Empty => {}
                    Input::Exit => break,
                    Input::Message(message) => println!("{}", message.trim_end()),
                    Input::Run(command) => {
                        if let Err(e) = commands::execute(app, command).await {
                            eprintln!("Error: {:#}", e);
                        }
                    }
                }

                print_notices(app);
                show_prompt();
                if ready.send(()).is_err() {
                    break;
                }
                continue;
            }
        }

        // A notice arriving while the prompt is idle goes on its own line
        let notices = app.drain_notices();
        if !notices.is_empty() {
            println!();
            for notice in &notices {
                println!("* {}", notice);
            }
            show_prompt();
        }
    }

    info!("Shell finished");
    Ok(())
}
