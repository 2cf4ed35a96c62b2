use std::io::{self, BufRead, Write};

use log::debug;
use malisp::Session;

// Plain line driver: one form per line from stdin, results to stdout.
fn main() -> io::Result<()> {
    env_logger::init();

    let session = Session::new();
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for line in io::stdin().lock().lines() {
        let line = line?;
        match session.rep(&line) {
            Ok(Some(output)) => writeln!(out, "{}", output)?,
            Ok(None) => {}
            Err(e) => {
                out.flush()?;
                eprintln!("Error: {}", e);
            }
        }
    }
    debug!("end of input");
    out.flush()
}
