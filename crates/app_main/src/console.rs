//! Console commands read from stdin

use app_core::{Rect, Size, SortBy, SortOrder};
use crossbeam_channel::Sender;
use std::io::BufRead;
use std::path::PathBuf;
use std::thread::JoinHandle;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsoleCommand {
    Next,
    Prev,
    Goto(usize),
    Rotate(i32),
    Crop(Rect),
    Zoom(Size),
    Remove,
    Sort(SortBy, SortOrder),
    Save(Option<PathBuf>),
    Wallpaper { region: Rect, screen: Size },
    Info,
    Help,
    Quit,
}

pub const HELP: &str = "\
commands:
  n | p                    next / previous
  g <i>                    go to position i (1-based)
  r <deg>                  rotate by a multiple of 90
  crop <x> <y> <w> <h>     crop the current item
  zoom <w> <h>             rescale the displayed bitmap
  rm                       delete the current file
  sort name|size|modified [desc]
  save [path]              save the current image
  wall <x> <y> <w> <h> <sw> <sh>
  info | help | q";

impl ConsoleCommand {
    /// Parse one input line. `Ok(None)` for a blank line.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let mut words = line.split_whitespace();
        let Some(head) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match (head, args.as_slice()) {
            ("n" | "next", []) => Self::Next,
            ("p" | "prev", []) => Self::Prev,
            ("g" | "goto", [pos]) => {
                let pos: usize = number(pos)?;
                if pos == 0 {
                    return Err("positions start at 1".into());
                }
                Self::Goto(pos - 1)
            }
            ("r" | "rotate", [deg]) => Self::Rotate(number(deg)?),
            ("crop", [x, y, w, h]) => Self::Crop(Rect::new(number(x)?, number(y)?, number(w)?, number(h)?)),
            ("zoom", [w, h]) => Self::Zoom(Size::new(number(w)?, number(h)?)),
            ("rm", []) => Self::Remove,
            ("sort", [key, rest @ ..]) => {
                let by = match *key {
                    "name" => SortBy::Name,
                    "size" => SortBy::Size,
                    "modified" => SortBy::Modified,
                    other => return Err(format!("unknown sort key: {}", other)),
                };
                let order = match rest {
                    [] | ["asc"] => SortOrder::Ascending,
                    ["desc"] => SortOrder::Descending,
                    _ => return Err("sort order must be asc or desc".into()),
                };
                Self::Sort(by, order)
            }
            ("save", []) => Self::Save(None),
            ("save", [path]) => Self::Save(Some(PathBuf::from(path))),
            ("wall", [x, y, w, h, sw, sh]) => Self::Wallpaper {
                region: Rect::new(number(x)?, number(y)?, number(w)?, number(h)?),
                screen: Size::new(number(sw)?, number(sh)?),
            },
            ("info" | "i", []) => Self::Info,
            ("help" | "?", []) => Self::Help,
            ("q" | "quit" | "exit", []) => Self::Quit,
            (other, _) => return Err(format!("unrecognized command: {} (try help)", other)),
        };
        Ok(Some(command))
    }
}

fn number<T: std::str::FromStr>(s: &str) -> Result<T, String> {
    s.parse().map_err(|_| format!("not a number: {}", s))
}

/// Read stdin on a background thread. End of input becomes `Quit`.
pub fn spawn_reader(tx: Sender<ConsoleCommand>) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new().name("imgdeck-console".into()).spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    tracing::warn!("Console read failed: {}", e);
                    break;
                }
            };
            match ConsoleCommand::parse(&line) {
                Ok(Some(command)) => {
                    let quit = command == ConsoleCommand::Quit;
                    if tx.send(command).is_err() || quit {
                        return;
                    }
                }
                Ok(None) => {}
                Err(message) => println!("{}", message),
            }
        }
        let _ = tx.send(ConsoleCommand::Quit);
    })
}
