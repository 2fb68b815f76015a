//! Command-line parsing.

use std::path::PathBuf;

pub const USAGE: &str = "\
Usage: micslice <command> [options]

Commands:
  record [--seconds <n>] [--replay <file.wav>]   record one sample, export it with crops
  listen [--ticks <n>] [--replay <file.wav>]     classify streaming slices, one JSON line per tick
  export <file.wav>                              crop an existing recording into the dataset
  devices                                        list input devices

Options:
  --settings <file.json>   settings file (default: app data dir)
  --output <dir>           dataset root (overrides settings)";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Record {
        seconds: Option<f32>,
        replay: Option<PathBuf>,
    },
    Listen {
        ticks: Option<u64>,
        replay: Option<PathBuf>,
    },
    Export {
        file: PathBuf,
    },
    Devices,
    Help,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Args {
    pub command: Command,
    pub settings: Option<PathBuf>,
    pub output: Option<PathBuf>,
}

pub fn parse_args<I>(args: I) -> Result<Args, String>
where
    I: IntoIterator<Item = String>,
{
    let mut it = args.into_iter();
    let Some(name) = it.next() else {
        return Ok(Args {
            command: Command::Help,
            settings: None,
            output: None,
        });
    };

    let mut seconds = None;
    let mut ticks = None;
    let mut replay = None;
    let mut settings = None;
    let mut output = None;
    let mut positional = Vec::new();

    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--seconds" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --seconds".into());
                };
                let parsed = v
                    .parse::<f32>()
                    .map_err(|_| "invalid value for --seconds".to_string())?;
                if !(parsed.is_finite() && parsed > 0.0) {
                    return Err("--seconds must be positive".into());
                }
                seconds = Some(parsed);
            }
            "--ticks" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --ticks".into());
                };
                ticks = Some(
                    v.parse::<u64>()
                        .map_err(|_| "invalid value for --ticks".to_string())?,
                );
            }
            "--replay" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --replay".into());
                };
                replay = Some(PathBuf::from(v));
            }
            "--settings" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --settings".into());
                };
                settings = Some(PathBuf::from(v));
            }
            "--output" => {
                let Some(v) = it.next() else {
                    return Err("missing value for --output".into());
                };
                output = Some(PathBuf::from(v));
            }
            "--help" | "-h" => {
                return Ok(Args {
                    command: Command::Help,
                    settings,
                    output,
                })
            }
            other if other.starts_with("--") => {
                return Err(format!("unknown argument: {other}"));
            }
            _ => positional.push(arg),
        }
    }

    let command = match name.as_str() {
        "record" => Command::Record { seconds, replay },
        "listen" => Command::Listen { ticks, replay },
        "export" => {
            if positional.is_empty() {
                return Err("export needs a WAV file".into());
            }
            Command::Export {
                file: PathBuf::from(positional.remove(0)),
            }
        }
        "devices" => Command::Devices,
        "help" | "--help" | "-h" => Command::Help,
        other => return Err(format!("unknown command: {other}")),
    };

    if !positional.is_empty() {
        return Err(format!("unexpected argument: {}", positional[0]));
    }

    Ok(Args {
        command,
        settings,
        output,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(line: &str) -> Result<Args, String> {
        parse_args(line.split_whitespace().map(String::from))
    }

    #[test]
    fn record_with_options() {
        let args = parse("record --seconds 2.5 --replay clip.wav --output out").unwrap();
        assert_eq!(
            args.command,
            Command::Record {
                seconds: Some(2.5),
                replay: Some(PathBuf::from("clip.wav")),
            }
        );
        assert_eq!(args.output, Some(PathBuf::from("out")));
    }

    #[test]
    fn export_requires_a_file() {
        assert!(parse("export").is_err());
        let args = parse("export take.wav").unwrap();
        assert_eq!(
            args.command,
            Command::Export {
                file: PathBuf::from("take.wav")
            }
        );
    }

    #[test]
    fn empty_and_unknown_input() {
        assert_eq!(parse("").unwrap().command, Command::Help);
        assert!(parse("record --bogus").is_err());
        assert!(parse("dance").is_err());
        assert!(parse("record --seconds -1").is_err());
        assert!(parse("devices extra").is_err());
    }

    #[test]
    fn listen_ticks() {
        let args = parse("listen --ticks 12").unwrap();
        assert_eq!(
            args.command,
            Command::Listen {
                ticks: Some(12),
                replay: None
            }
        );
    }
}
