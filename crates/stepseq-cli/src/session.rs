//! Line-oriented editing session
//!
//! Each input line is one command. Edits go through the shared
//! [`PatternStore`], so a running transport hears them on its next tick.

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use stepseq_core::{codec, Editor, LaneSettings, PatternStore, PlacementKey};
use stepseq_services::Scheduler;
use tracing::debug;

use crate::grid;

const HELP: &str = "\
commands:
  toggle NAME STEP          add a note, or remove the one covering STEP
  resize NAME START LEN     set the length of the note starting at START
  drag NAME TAIL DX         drag the end of a note by DX pixels
  delete NAME START         remove the note starting at START
  bpm N | steps N           set tempo or loop length
  swing S                   delay odd steps by S half-steps (0.0-1.0)
  mute NAME | solo NAME     toggle lane mute or solo
  gain NAME G               set lane gain (0.0-1.0)
  play | stop | reset       transport
  preview NAME              sound one note now
  show                      print the grid
  export PATH | import PATH save or load a pattern document
  quit";

/// One parsed session command
#[derive(Debug, Clone, PartialEq)]
pub enum SessionCommand {
    Toggle { name: String, step: u32 },
    Resize { name: String, start: u32, length: u32 },
    Drag { name: String, tail: u32, dx: f32 },
    Delete { name: String, start: u32 },
    Bpm(u32),
    Swing(f32),
    Steps(u32),
    Mute(String),
    Solo(String),
    Gain { name: String, gain: f32 },
    Play,
    Stop,
    Reset,
    Preview(String),
    Show,
    Export(PathBuf),
    Import(PathBuf),
    Help,
    Quit,
}

fn number<T: std::str::FromStr>(args: &[&str], index: usize, what: &str) -> Result<T> {
    let Some(raw) = args.get(index) else {
        bail!("missing {what}");
    };
    raw.parse().map_err(|_| anyhow::anyhow!("invalid {what}: {raw}"))
}

fn word(args: &[&str], index: usize, what: &str) -> Result<String> {
    args.get(index)
        .map(|s| s.to_string())
        .with_context(|| format!("missing {what}"))
}

impl SessionCommand {
    /// Parse one line. Blank lines and `#` comments give `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        let mut parts = line.split_whitespace();
        let Some(verb) = parts.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = parts.collect();

        let command = match verb {
            "toggle" | "t" => Self::Toggle {
                name: word(&args, 0, "note name")?,
                step: number(&args, 1, "step")?,
            },
            "resize" => Self::Resize {
                name: word(&args, 0, "note name")?,
                start: number(&args, 1, "start step")?,
                length: number(&args, 2, "length")?,
            },
            "drag" => Self::Drag {
                name: word(&args, 0, "note name")?,
                tail: number(&args, 1, "tail step")?,
                dx: number(&args, 2, "pixel offset")?,
            },
            "delete" | "rm" => Self::Delete {
                name: word(&args, 0, "note name")?,
                start: number(&args, 1, "start step")?,
            },
            "bpm" => Self::Bpm(number(&args, 0, "tempo")?),
            "swing" => Self::Swing(number(&args, 0, "swing amount")?),
            "steps" => Self::Steps(number(&args, 0, "step count")?),
            "mute" => Self::Mute(word(&args, 0, "note name")?),
            "solo" => Self::Solo(word(&args, 0, "note name")?),
            "gain" => Self::Gain {
                name: word(&args, 0, "note name")?,
                gain: number(&args, 1, "gain")?,
            },
            "play" => Self::Play,
            "stop" => Self::Stop,
            "reset" => Self::Reset,
            "preview" | "p" => Self::Preview(word(&args, 0, "note name")?),
            "show" | "ls" => Self::Show,
            "export" => Self::Export(word(&args, 0, "path")?.into()),
            "import" => Self::Import(word(&args, 0, "path")?.into()),
            "help" | "?" => Self::Help,
            "quit" | "exit" | "q" => Self::Quit,
            other => bail!("unknown command: {other}"),
        };
        Ok(Some(command))
    }
}

/// What the session loop does after a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    scheduler: Scheduler,
    editor: Editor,
}

impl Session {
    pub fn new(scheduler: Scheduler) -> Self {
        Self {
            scheduler,
            editor: Editor::default(),
        }
    }

    fn store(&self) -> &PatternStore {
        self.scheduler.store()
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    /// Read commands until `quit` or end of input
    pub fn run(&mut self, mut input: impl BufRead, out: &mut impl Write) -> Result<()> {
        let mut line = String::new();
        loop {
            write!(out, "> ")?;
            out.flush()?;
            line.clear();
            if input.read_line(&mut line)? == 0 {
                writeln!(out)?;
                break;
            }

            let command = match SessionCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    writeln!(out, "error: {e}")?;
                    continue;
                }
            };
            debug!(?command, "Session command");

            match self.execute(command, out) {
                Ok(Flow::Quit) => break,
                Ok(Flow::Continue) => {}
                Err(e) => writeln!(out, "error: {e:#}")?,
            }
        }
        self.scheduler.stop();
        Ok(())
    }

    pub fn execute(&mut self, command: SessionCommand, out: &mut impl Write) -> Result<Flow> {
        match command {
            SessionCommand::Toggle { name, step } => {
                let steps = self.store().snapshot().total_steps();
                if step >= steps {
                    bail!("step {step} is outside the loop (0-{})", steps - 1);
                }
                let pattern = self.store().toggle_note(step, &name);
                match pattern.covering(&name, step) {
                    Some(_) => writeln!(out, "added {name} at {step}")?,
                    None => writeln!(out, "removed {name} at {step}")?,
                }
            }
            SessionCommand::Resize { name, start, length } => {
                let key = PlacementKey::new(name, start);
                let pattern = self.store().resize_note(&key, length);
                let Some(placement) = pattern.find(&key) else {
                    bail!("no {} note starts at {}", key.name, key.start);
                };
                writeln!(out, "{} at {} is {} steps", key.name, key.start, placement.length)?;
            }
            SessionCommand::Drag { name, tail, dx } => {
                let pattern = self.store().snapshot();
                if !self.editor.begin_resize(&pattern, &name, tail, 0.0) {
                    bail!("step {tail} is not the end of a {name} note");
                }
                self.editor.pointer_moved(dx);
                let key = self.editor.active().cloned();
                let pattern = self.editor.end_resize(self.scheduler.store()).unwrap_or(pattern);
                if let Some(placement) = key.as_ref().and_then(|k| pattern.find(k)) {
                    writeln!(out, "{name} at {} is {} steps", placement.start, placement.length)?;
                }
            }
            SessionCommand::Delete { name, start } => {
                let key = PlacementKey::new(name, start);
                if self.store().snapshot().find(&key).is_none() {
                    bail!("no {} note starts at {}", key.name, key.start);
                }
                self.store().delete_note(&key);
                writeln!(out, "removed {} at {}", key.name, key.start)?;
            }
            SessionCommand::Bpm(bpm) => {
                let pattern = self.scheduler.set_bpm(bpm);
                writeln!(out, "{} bpm", pattern.bpm())?;
            }
            SessionCommand::Swing(swing) => {
                let pattern = self.scheduler.set_swing(swing);
                writeln!(out, "swing {:.2}", pattern.swing())?;
            }
            SessionCommand::Steps(steps) => {
                let before = self.store().snapshot().len();
                let pattern = self.store().set_total_steps(steps);
                writeln!(out, "{} steps", pattern.total_steps())?;
                if pattern.len() < before {
                    writeln!(out, "dropped {} notes past the end", before - pattern.len())?;
                }
            }
            SessionCommand::Mute(name) => {
                let lane = self.store().snapshot().lane(&name);
                let lane = LaneSettings { muted: !lane.muted, ..lane };
                self.store().set_lane(&name, lane);
                writeln!(out, "{name} {}", if lane.muted { "muted" } else { "unmuted" })?;
            }
            SessionCommand::Solo(name) => {
                let lane = self.store().snapshot().lane(&name);
                let lane = LaneSettings { solo: !lane.solo, ..lane };
                self.store().set_lane(&name, lane);
                writeln!(out, "{name} solo {}", if lane.solo { "on" } else { "off" })?;
            }
            SessionCommand::Gain { name, gain } => {
                let lane = self.store().snapshot().lane(&name);
                let pattern = self.store().set_lane(&name, LaneSettings { gain, ..lane });
                writeln!(out, "{name} gain {:.2}", pattern.lane(&name).gain)?;
            }
            SessionCommand::Play => {
                self.scheduler.play();
                writeln!(out, "playing from step {}", self.scheduler.current_step())?;
            }
            SessionCommand::Stop => {
                self.scheduler.stop();
                writeln!(out, "stopped at step {}", self.scheduler.current_step())?;
            }
            SessionCommand::Reset => {
                self.editor.cancel();
                self.scheduler.reset();
                writeln!(out, "reset")?;
            }
            SessionCommand::Preview(name) => {
                if !self.scheduler.preview(&name)? {
                    bail!("{name} is not in the catalog");
                }
            }
            SessionCommand::Show => {
                let playhead = self.scheduler.is_running().then(|| self.scheduler.current_step());
                let text = grid::render(&self.store().snapshot(), &self.scheduler.catalog(), playhead);
                write!(out, "{text}")?;
            }
            SessionCommand::Export(path) => {
                codec::export_to_path(&self.store().snapshot(), &path)
                    .with_context(|| format!("Failed to export {}", path.display()))?;
                writeln!(out, "saved {}", path.display())?;
            }
            SessionCommand::Import(path) => {
                let pattern = codec::import_from_path(&path, self.store().defaults())
                    .with_context(|| format!("Failed to import {}", path.display()))?;
                self.editor.cancel();
                let pattern = self.store().replace(pattern);
                writeln!(
                    out,
                    "loaded {}: {} bpm, {} steps, {} notes",
                    path.display(),
                    pattern.bpm(),
                    pattern.total_steps(),
                    pattern.len()
                )?;
            }
            SessionCommand::Help => writeln!(out, "{HELP}")?,
            SessionCommand::Quit => return Ok(Flow::Quit),
        }
        Ok(Flow::Continue)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use stepseq_core::{Catalog, CatalogEntry, PatternDefaults};
    use stepseq_services::{Playback, PlaybackError, Trigger};

    use super::*;

    #[derive(Default)]
    struct RecordingPlayback {
        played: Mutex<Vec<Trigger>>,
    }

    impl Playback for RecordingPlayback {
        fn play(&self, trigger: &Trigger) -> Result<(), PlaybackError> {
            self.played.lock().unwrap().push(trigger.clone());
            Ok(())
        }
    }

    fn session(playback: Arc<RecordingPlayback>) -> Session {
        let store = Arc::new(PatternStore::new(PatternDefaults::new(120, 8)));
        let catalog = Arc::new(Catalog::from_entries([
            CatalogEntry::new("C4", "/sounds/C4.wav"),
            CatalogEntry::new("D4", "/sounds/D4.wav"),
        ]));
        Session::new(Scheduler::new(store, catalog, playback))
    }

    fn exec(session: &mut Session, line: &str) -> Result<String> {
        let command = SessionCommand::parse(line)?.context("blank line")?;
        let mut out = Vec::new();
        session.execute(command, &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(
            SessionCommand::parse("toggle C4 3").unwrap(),
            Some(SessionCommand::Toggle { name: "C4".into(), step: 3 })
        );
        assert_eq!(
            SessionCommand::parse("  drag D4 5 -70.5 ").unwrap(),
            Some(SessionCommand::Drag { name: "D4".into(), tail: 5, dx: -70.5 })
        );
        assert_eq!(SessionCommand::parse("bpm 90").unwrap(), Some(SessionCommand::Bpm(90)));
        assert_eq!(SessionCommand::parse("swing 0.3").unwrap(), Some(SessionCommand::Swing(0.3)));
        assert_eq!(SessionCommand::parse("q").unwrap(), Some(SessionCommand::Quit));
        assert_eq!(SessionCommand::parse("").unwrap(), None);
        assert_eq!(SessionCommand::parse("# comment").unwrap(), None);
    }

    #[test]
    fn test_parse_errors() {
        assert!(SessionCommand::parse("toggle C4").is_err());
        assert!(SessionCommand::parse("toggle C4 x").is_err());
        assert!(SessionCommand::parse("steps -1").is_err());
        assert!(SessionCommand::parse("swing").is_err());
        assert!(SessionCommand::parse("explode").is_err());
    }

    #[test]
    fn test_toggle_resize_delete() {
        let mut session = session(Arc::default());

        assert_eq!(exec(&mut session, "toggle C4 1").unwrap(), "added C4 at 1\n");
        assert_eq!(exec(&mut session, "resize C4 1 3").unwrap(), "C4 at 1 is 3 steps\n");
        // step 2 is covered, so toggling there removes the note
        assert_eq!(exec(&mut session, "toggle C4 2").unwrap(), "removed C4 at 2\n");
        assert!(session.scheduler().store().snapshot().is_empty());

        assert!(exec(&mut session, "toggle C4 8").is_err());
        assert!(exec(&mut session, "resize C4 0 2").is_err());
        assert!(exec(&mut session, "delete C4 0").is_err());

        exec(&mut session, "toggle D4 4").unwrap();
        assert_eq!(exec(&mut session, "delete D4 4").unwrap(), "removed D4 at 4\n");
        assert!(session.scheduler().store().snapshot().is_empty());
    }

    #[test]
    fn test_drag_from_tail() {
        let mut session = session(Arc::default());
        exec(&mut session, "toggle C4 2").unwrap();

        assert_eq!(exec(&mut session, "drag C4 2 70").unwrap(), "C4 at 2 is 3 steps\n");
        assert!(exec(&mut session, "drag C4 2 35").is_err());
        // clamped to the loop end
        assert_eq!(exec(&mut session, "drag C4 4 1000").unwrap(), "C4 at 2 is 6 steps\n");
    }

    #[test]
    fn test_tempo_steps_and_lanes() {
        let mut session = session(Arc::default());
        exec(&mut session, "toggle C4 6").unwrap();

        assert_eq!(exec(&mut session, "bpm 500").unwrap(), "240 bpm\n");
        assert_eq!(exec(&mut session, "swing 0.6").unwrap(), "swing 0.60\n");
        assert_eq!(exec(&mut session, "swing 3").unwrap(), "swing 1.00\n");
        assert_eq!(exec(&mut session, "swing -1").unwrap(), "swing 0.00\n");
        assert_eq!(
            exec(&mut session, "steps 4").unwrap(),
            "4 steps\ndropped 1 notes past the end\n"
        );
        assert_eq!(exec(&mut session, "mute C4").unwrap(), "C4 muted\n");
        assert_eq!(exec(&mut session, "solo D4").unwrap(), "D4 solo on\n");
        assert_eq!(exec(&mut session, "gain D4 2").unwrap(), "D4 gain 1.00\n");

        let pattern = session.scheduler().store().snapshot();
        assert!(pattern.lane("C4").muted);
        assert!(pattern.has_solo());
    }

    #[test]
    fn test_preview_unknown_name() {
        let playback = Arc::new(RecordingPlayback::default());
        let mut session = session(playback.clone());

        exec(&mut session, "preview D4").unwrap();
        assert!(exec(&mut session, "preview ghost").is_err());
        assert_eq!(playback.played.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_export_import_and_reset() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pattern.json");
        let mut session = session(Arc::default());
        exec(&mut session, "toggle C4 0").unwrap();
        exec(&mut session, "bpm 100").unwrap();

        exec(&mut session, &format!("export {}", path.display())).unwrap();
        exec(&mut session, "reset").unwrap();
        let pattern = session.scheduler().store().snapshot();
        assert!(pattern.is_empty());
        assert_eq!(pattern.bpm(), 120);

        exec(&mut session, &format!("import {}", path.display())).unwrap();
        let pattern = session.scheduler().store().snapshot();
        assert_eq!(pattern.bpm(), 100);
        assert_eq!(pattern.len(), 1);

        std::fs::write(&path, r#"{"soundTrack": "nope"}"#).unwrap();
        assert!(exec(&mut session, &format!("import {}", path.display())).is_err());
        assert_eq!(session.scheduler().store().snapshot().len(), 1);
    }

    #[test]
    fn test_run_reads_until_quit() {
        let mut session = session(Arc::default());
        let input = "toggle C4 0\nbogus\nshow\nquit\ntoggle D4 1\n";
        let mut out = Vec::new();
        session.run(input.as_bytes(), &mut out).unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("added C4 at 0"));
        assert!(text.contains("error: unknown command: bogus"));
        assert!(text.contains("C4   #......."));
        assert!(!text.contains("D4 at 1"));
    }
}
