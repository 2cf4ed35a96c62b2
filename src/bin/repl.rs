use std::borrow::Cow;
use std::process;

use log::{debug, warn};
use malisp::config::{EditMode, ReplConfig};
use malisp::evaluator::special_form_identifiers;
use malisp::lexer::TokenKind;
use malisp::{Environment, Session, tokenize};
use rustyline::error::ReadlineError;
use rustyline::highlight::{CmdKind, Highlighter};
use rustyline::validate::{ValidationContext, ValidationResult, Validator};
use rustyline::{Cmd, Completer, Context, Editor, EventHandler, KeyCode, KeyEvent, Modifiers};
use rustyline::{Helper, Highlighter, Hinter, Validator};

struct MalispCompleter {
    env: Environment,
}

impl rustyline::completion::Completer for MalispCompleter {
    type Candidate = String;
    fn complete(
        &self,
        line: &str,
        pos: usize,
        _ctx: &Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        // Only an atom ending right at the cursor is completed
        let (start, prefix) = match tokenize(&line[..pos]) {
            Ok(tokens) => match tokens.last() {
                Some(token) if token.span.end == pos => match &token.kind {
                    TokenKind::Atom(prefix) => (token.span.start, prefix.clone()),
                    _ => return Ok((pos, vec![])),
                },
                _ => return Ok((pos, vec![])),
            },
            Err(_) => return Ok((pos, vec![])),
        };
        let mut candidates: Vec<String> = self
            .env
            .get_identifiers()
            .union(&special_form_identifiers())
            .filter(|id| id.starts_with(&prefix))
            .cloned()
            .collect();
        candidates.sort();
        Ok((start, candidates))
    }
}

#[derive(Completer, Helper, Highlighter, Hinter, Validator)]
struct MalispHelper {
    #[rustyline(Validator)]
    validator: MalispValidator,
    #[rustyline(Highlighter)]
    highlighter: MalispHighlighter,
    #[rustyline(Completer)]
    completer: MalispCompleter,
}

fn matches_close(opening: char, closing: char) -> bool {
    matches!((opening, closing), ('(', ')') | ('[', ']') | ('{', '}'))
}

struct MalispValidator;

impl Validator for MalispValidator {
    fn validate(&self, ctx: &mut ValidationContext) -> rustyline::Result<ValidationResult> {
        let input = ctx.input();
        let mut stack = Vec::new();
        let mut in_string = false;
        let mut in_comment = false;
        let mut escape = false;

        for (i, c) in input.char_indices() {
            if in_comment {
                in_comment = c != '\n';
                continue;
            }
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                continue;
            }

            match c {
                '"' => in_string = true,
                ';' => in_comment = true,
                '(' | '[' | '{' => stack.push(c),
                ')' | ']' | '}' => match stack.pop() {
                    Some(opening) if matches_close(opening, c) => {}
                    _ => {
                        return Ok(ValidationResult::Invalid(Some(format!(
                            "  - Unmatched '{}' at position {}",
                            c, i
                        ))));
                    }
                },
                _ => {}
            }
        }

        if in_string || !stack.is_empty() {
            Ok(ValidationResult::Incomplete)
        } else {
            Ok(ValidationResult::Valid(None))
        }
    }
}

struct MalispHighlighter;

impl Highlighter for MalispHighlighter {
    fn highlight<'l>(&self, line: &'l str, pos: usize) -> Cow<'l, str> {
        let mut stack: Vec<(char, usize, usize)> = Vec::new();
        let mut highlighted = String::new();
        let mut in_string = false;
        let mut escape = false;
        // The bracket just left of the cursor and its partner are emphasised
        let cursor = pos.checked_sub(1);

        for (i, c) in line.char_indices() {
            if in_string {
                if escape {
                    escape = false;
                } else if c == '\\' {
                    escape = true;
                } else if c == '"' {
                    in_string = false;
                }
                highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c)); // Green for strings
                continue;
            }

            match c {
                '"' => {
                    in_string = true;
                    highlighted.push_str(&format!("\x1b[32m{}\x1b[0m", c));
                }
                ';' => {
                    highlighted.push_str(&format!("\x1b[90m{}\x1b[0m", &line[i..])); // Grey for comments
                    break;
                }
                '(' | '[' | '{' => {
                    stack.push((c, i, highlighted.len()));
                    highlighted.push(c);
                }
                ')' | ']' | '}' => match stack.pop() {
                    Some((opening, opened_at, matching_pos)) if matches_close(opening, c) => {
                        if cursor == Some(opened_at) || cursor == Some(i) {
                            highlighted.push_str(&format!("\x1b[34m{}\x1b[0m", c)); // Blue for matching brackets
                            highlighted.replace_range(
                                matching_pos..matching_pos + opening.len_utf8(),
                                &format!("\x1b[1;34m{}\x1b[0m", opening),
                            );
                        } else {
                            highlighted.push(c);
                        }
                    }
                    Some((opening, _, matching_pos)) => {
                        highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)); // Red for mismatched brackets
                        highlighted.replace_range(
                            matching_pos..matching_pos + opening.len_utf8(),
                            &format!("\x1b[1;31m{}\x1b[0m", opening),
                        );
                    }
                    None => highlighted.push_str(&format!("\x1b[31m{}\x1b[0m", c)),
                },
                _ => highlighted.push(c),
            }
        }

        Cow::Owned(highlighted)
    }

    fn highlight_char(&self, _line: &str, _pos: usize, _kind: CmdKind) -> bool {
        true
    }
}

fn main() -> rustyline::Result<()> {
    env_logger::init();

    let config = match ReplConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("malisp: {}", e);
            process::exit(2);
        }
    };

    println!("malisp REPL v{}", env!("CARGO_PKG_VERSION"));
    println!("Type 'exit' or press Ctrl-D to quit.");

    let session = Session::new();
    let helper = MalispHelper {
        highlighter: MalispHighlighter,
        validator: MalispValidator,
        completer: MalispCompleter {
            env: session.env().clone(),
        },
    };
    let edit_mode = match config.edit_mode {
        EditMode::Vi => rustyline::EditMode::Vi,
        EditMode::Emacs => rustyline::EditMode::Emacs,
    };
    let editor_config = rustyline::config::Config::builder()
        .edit_mode(edit_mode)
        .build();
    let mut rl = Editor::with_config(editor_config)?;
    rl.set_helper(Some(helper));
    rl.bind_sequence(
        KeyEvent(KeyCode::Char('s'), Modifiers::CTRL),
        EventHandler::Simple(Cmd::Newline),
    );
    if let Err(e) = rl.load_history(&config.history_file) {
        warn!("no history loaded from {}: {}", config.history_file, e);
    }

    loop {
        match rl.readline(&config.prompt) {
            Ok(line) => {
                rl.add_history_entry(line.as_str())?;
                if line.trim().eq_ignore_ascii_case("exit") {
                    break;
                }
                match session.rep(&line) {
                    Ok(Some(output)) => println!("{}", output),
                    Ok(None) => {}
                    Err(e) => {
                        if let Err(io_err) = e.pretty_print(&line) {
                            warn!("could not render diagnostic: {}", io_err);
                            eprintln!("Error: {}", e);
                        }
                    }
                }
            }
            Err(ReadlineError::Interrupted) => {
                // Ctrl-C
                println!("Interrupted. Type 'exit' or Ctrl-D to quit.");
            }
            Err(ReadlineError::Eof) => {
                // Ctrl-D
                break;
            }
            Err(err) => {
                eprintln!("Readline Error: {:?}", err);
                break;
            }
        }
    }
    debug!("saving history to {}", config.history_file);
    rl.save_history(&config.history_file)
}
