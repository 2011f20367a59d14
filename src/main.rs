use std::io::{self, IsTerminal, Write};

use rustyline::error::ReadlineError;
use rustyline::Editor;
use tracing::warn;
use tracing_subscriber::EnvFilter;

use mlparse::config;
use mlparse::eval::Interpreter;
use mlparse::parser::MiniParser;
use mlparse::session::Session;
use mlparse::types::Outcome;
use mlparse::validate::SourceValidator;

type ReplSession = Session<MiniParser, Interpreter>;

const PROMPT: &str = "mlparse> ";
const CONTINUATION_PROMPT: &str = "mlparse* ";

/// Lines waiting for the rest of an open construct.
#[derive(Default)]
struct Pending {
    buffer: String,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Append `line` and run the whole buffer. Keeps the buffer only while the input is open.
    fn feed(&mut self, session: &mut ReplSession, line: &str) {
        if !self.buffer.is_empty() {
            self.buffer.push('\n');
        }
        self.buffer.push_str(line);

        let result = session.run_source(&self.buffer);
        io::stdout().flush().ok();
        match result {
            Ok(Outcome::Incomplete) => {}
            Ok(_) => self.buffer.clear(),
            Err(e) => {
                eprintln!("Error: {}", e);
                self.buffer.clear();
            }
        }
    }
}

/// Run the interactive REPL with rustyline (when stdin is a TTY).
fn run_interactive(session: &mut ReplSession) {
    let mut rl = match Editor::with_config(
        rustyline::Config::builder()
            .auto_add_history(true)
            .build(),
    ) {
        Ok(rl) => rl,
        Err(e) => {
            eprintln!("Failed to initialize editor: {}", e);
            run_simple(session);
            return;
        }
    };

    rl.set_helper(Some(SourceValidator::new()));

    // Load history
    if let Some(path) = config::history_path().filter(|p| p.exists()) {
        if let Err(e) = rl.load_history(&path) {
            warn!(path = %path.display(), error = %e, "failed to load history");
        }
    }

    println!("mlparse {}", config::VERSION);
    println!("Type 'exit' to quit, Ctrl-D for EOF");
    println!();

    let mut pending = Pending::default();
    loop {
        if let Some(helper) = rl.helper_mut() {
            helper.update_words(session.engine().defined_names());
        }

        let prompt = if pending.is_empty() {
            PROMPT
        } else {
            CONTINUATION_PROMPT
        };
        match rl.readline(prompt) {
            Ok(line) => {
                let trimmed = line.trim();
                if pending.is_empty() {
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed == "exit" || trimmed == "quit" {
                        println!("Goodbye!");
                        break;
                    }
                }
                pending.feed(session, &line);
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C: drop the open construct, continue
                pending = Pending::default();
                println!();
                continue;
            }
            Err(ReadlineError::Eof) => {
                println!("\nGoodbye!");
                break;
            }
            Err(err) => {
                eprintln!("Read error: {}", err);
                break;
            }
        }
    }

    // Save history
    if let Some(path) = config::history_path() {
        if let Err(e) = rl.save_history(&path) {
            warn!(path = %path.display(), error = %e, "failed to save history");
        }
    }
}

/// Run the simple REPL for pipe mode (when stdin is not a TTY).
fn run_simple(session: &mut ReplSession) {
    let stdin = io::stdin();
    let mut line = String::new();
    let mut pending = Pending::default();

    loop {
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => {
                // EOF
                break;
            }
            Ok(_) => {
                let text = line.trim_end_matches(['\n', '\r']);
                if pending.is_empty() {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        continue;
                    }
                    if trimmed == "exit" || trimmed == "quit" {
                        break;
                    }
                }
                pending.feed(session, text);
            }
            Err(e) => {
                eprintln!("Read error: {}", e);
                break;
            }
        }
    }

    if !pending.is_empty() {
        warn!(source = %pending.buffer, "input ended inside an open construct");
        eprintln!("Error: unexpected end of input");
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let mut session = Session::new(MiniParser, Interpreter::new(io::stdout()));
    if let Err(e) = session.init() {
        eprintln!("Failed to start session: {}", e);
        std::process::exit(1);
    }
    session.set_print_level(config::print_level_from_env());

    if io::stdin().is_terminal() {
        run_interactive(&mut session);
    } else {
        run_simple(&mut session);
    }

    if let Err(e) = session.finalize() {
        eprintln!("Error: {}", e);
    }
}
