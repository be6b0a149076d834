//! Operator dialog used when connectivity is lost.

use std::io::{BufRead, Write};

/// What the operator told us to do with a failing URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorChoice {
    Continue,
    Skip,
}

impl OperatorChoice {
    pub fn as_str(self) -> &'static str {
        match self {
            OperatorChoice::Continue => "continue",
            OperatorChoice::Skip => "skip",
        }
    }
}

/// Blocking prompt seam. Production reads stdin; tests script the answers.
pub trait OperatorConsole: Send + Sync {
    /// Ask what to do with a URL that exhausted its retries while the
    /// connectivity probe is also failing. Implementations only return a
    /// valid choice; EOF and interrupts mean skip.
    fn ask(&self, url: &str, cycle: u32, max_cycles: u32, attempts_per_cycle: u32)
        -> OperatorChoice;
}

/// Interactive console on stdin/stdout.
pub struct StdinConsole;

impl OperatorConsole for StdinConsole {
    fn ask(
        &self,
        url: &str,
        cycle: u32,
        max_cycles: u32,
        attempts_per_cycle: u32,
    ) -> OperatorChoice {
        let divider = "=".repeat(60);
        println!("\n{divider}");
        println!("NETWORK CONNECTIVITY ISSUE DETECTED");
        println!("{divider}");
        println!("Failed to fetch URL after {attempts_per_cycle} attempts:");
        println!("  {url}");
        println!("\nConnectivity test also failed; this looks like a network problem.");
        println!("\nRetry cycle: {cycle}/{max_cycles}");
        if cycle >= max_cycles {
            println!("WARNING: final retry cycle; after this the URL is skipped automatically.");
        }
        println!("\nOptions:");
        println!("  continue - Retry this URL ({attempts_per_cycle} more attempts)");
        println!("  skip     - Skip this URL and move on");
        println!("{divider}");

        let stdin = std::io::stdin();
        loop {
            print!("Enter your choice (continue/skip): ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            match stdin.lock().read_line(&mut line) {
                // EOF or a read error is treated as a graceful skip.
                Ok(0) | Err(_) => {
                    println!("\nInput closed; choosing 'skip' to continue gracefully.");
                    return OperatorChoice::Skip;
                }
                Ok(_) => match line.trim().to_lowercase().as_str() {
                    "continue" => return OperatorChoice::Continue,
                    "skip" => return OperatorChoice::Skip,
                    _ => println!("Invalid choice. Please enter 'continue' or 'skip'."),
                },
            }
        }
    }
}
