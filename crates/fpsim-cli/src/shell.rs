//! Line-oriented operator shell.
//!
//! Session commands (`auth 1`, `cancel 1`, `down`, ...) drive the open
//! session. Anything else is passed to the service's own shell handler
//! (`help`, `dump`, `set key=value`, ...).

use std::sync::Arc;

use anyhow::{Context, Result, bail};
use fpsim_core::{HardwareAuthToken, OperationId, OperationKind};
use fpsim_engine::{Session, SessionCallback, VirtualFingerprint};

pub const SESSION_HELP: &str = "\
Session commands:
  enroll <op> [challenge]   enroll with a token answering the challenge
  auth <op>                 authenticate
  detect <op>               detect interaction
  challenge <op>            generate a challenge
  revoke <op> <challenge>   revoke a challenge
  authid <op>               get the authenticator id
  invalidate <op>           invalidate the authenticator id
  list <op>                 enumerate enrollments
  remove <op> <id,...>      remove enrollments
  resetlockout <op>         clear lockout
  cancel <op>               cancel an operation
  down [x y]                pointer down
  up                        pointer up
  uiready                   display ready over the sensor
  props                     print sensor props
  reopen [user]             close the session and open a new one
  quit                      close the session and exit
";

/// A parsed shell line.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Submit(OperationId, OperationKind),
    Cancel(OperationId),
    PointerDown { x: i32, y: i32 },
    PointerUp,
    UiReady,
    Props,
    Reopen { user_id: Option<i32> },
    Help,
    Quit,
    /// Forwarded to [`VirtualFingerprint::handle_shell_command`].
    Service(Vec<String>),
}

/// Parse one input line. Blank lines and `#` comments yield `None`.
pub fn parse(line: &str) -> Result<Option<Command>> {
    let words: Vec<&str> = line.split_whitespace().collect();
    let Some((&name, args)) = words.split_first() else {
        return Ok(None);
    };
    if name.starts_with('#') {
        return Ok(None);
    }

    let command = match name {
        "enroll" => {
            let challenge = match args.get(1) {
                Some(text) => number(text, "challenge")?,
                None => 0,
            };
            Command::Submit(
                op(args)?,
                OperationKind::Enroll {
                    token: HardwareAuthToken::for_challenge(challenge),
                },
            )
        }
        "auth" | "authenticate" => Command::Submit(op(args)?, OperationKind::Authenticate),
        "detect" => Command::Submit(op(args)?, OperationKind::DetectInteraction),
        "challenge" => Command::Submit(op(args)?, OperationKind::GenerateChallenge),
        "revoke" => {
            let challenge = args.get(1).context("missing challenge")?;
            Command::Submit(
                op(args)?,
                OperationKind::RevokeChallenge {
                    challenge: number(challenge, "challenge")?,
                },
            )
        }
        "authid" => Command::Submit(op(args)?, OperationKind::GetAuthenticatorId),
        "invalidate" => Command::Submit(op(args)?, OperationKind::InvalidateAuthenticatorId),
        "list" => Command::Submit(op(args)?, OperationKind::EnumerateEnrollments),
        "remove" => {
            let ids = args.get(1).context("missing enrollment ids")?;
            let enrollment_ids = ids
                .split(',')
                .map(|id| number(id, "enrollment id"))
                .collect::<Result<Vec<i32>>>()?;
            Command::Submit(op(args)?, OperationKind::RemoveEnrollments { enrollment_ids })
        }
        "resetlockout" => Command::Submit(
            op(args)?,
            OperationKind::ResetLockout {
                token: HardwareAuthToken::default(),
            },
        ),
        "cancel" => Command::Cancel(op(args)?),
        "down" => match args {
            [] => Command::PointerDown { x: 0, y: 0 },
            [x, y] => Command::PointerDown {
                x: number(x, "x")?,
                y: number(y, "y")?,
            },
            _ => bail!("usage: down [x y]"),
        },
        "up" => Command::PointerUp,
        "uiready" => Command::UiReady,
        "props" => Command::Props,
        "reopen" => Command::Reopen {
            user_id: args.first().map(|id| number(id, "user id")).transpose()?,
        },
        "quit" | "exit" => Command::Quit,
        "help" => Command::Help,
        _ => Command::Service(words.iter().map(|w| w.to_string()).collect()),
    };
    Ok(Some(command))
}

fn op(args: &[&str]) -> Result<OperationId> {
    let text = args.first().context("missing operation id")?;
    Ok(OperationId(number(text, "operation id")?))
}

fn number<T: std::str::FromStr>(text: &str, what: &str) -> Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    text.trim()
        .parse()
        .with_context(|| format!("invalid {what} {text:?}"))
}

/// Whether the shell keeps reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flow {
    Continue,
    Quit,
}

/// Shell state: the service, the open session and the callback every
/// session reports to.
pub struct Shell {
    service: VirtualFingerprint,
    session: Arc<Session>,
    callback: Arc<dyn SessionCallback>,
}

impl Shell {
    pub fn new(
        service: VirtualFingerprint,
        user_id: i32,
        callback: Arc<dyn SessionCallback>,
    ) -> Result<Self> {
        let sensor_id = service.sensor_props().sensor_id;
        let session = service.create_session(sensor_id, user_id, Arc::clone(&callback))?;
        Ok(Self {
            service,
            session,
            callback,
        })
    }

    pub async fn execute(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Submit(operation_id, kind) => {
                self.session.submit(operation_id, kind)?;
            }
            Command::Cancel(operation_id) => self.session.cancel(operation_id),
            Command::PointerDown { x, y } => self.session.on_pointer_down(0, x, y, 0.0, 0.0)?,
            Command::PointerUp => self.session.on_pointer_up(0)?,
            Command::UiReady => self.session.on_ui_ready()?,
            Command::Props => {
                println!("{}", serde_json::to_string_pretty(&self.service.sensor_props())?);
            }
            Command::Reopen { user_id } => {
                let user_id = user_id.unwrap_or(self.session.user_id());
                self.session.close().await;
                let sensor_id = self.service.sensor_props().sensor_id;
                self.session = self.service.create_session(
                    sensor_id,
                    user_id,
                    Arc::clone(&self.callback),
                )?;
            }
            Command::Help => {
                print!("{SESSION_HELP}");
                print!("{}", self.service.handle_shell_command(&["help"])?);
            }
            Command::Quit => return Ok(Flow::Quit),
            Command::Service(words) => {
                let args: Vec<&str> = words.iter().map(String::as_str).collect();
                print!("{}", self.service.handle_shell_command(&args)?);
            }
        }
        Ok(Flow::Continue)
    }

    pub async fn close(self) {
        self.session.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("auth 1", Command::Submit(OperationId(1), OperationKind::Authenticate))]
    #[case("  detect 2 ", Command::Submit(OperationId(2), OperationKind::DetectInteraction))]
    #[case("cancel 7", Command::Cancel(OperationId(7)))]
    #[case("down 400 1600", Command::PointerDown { x: 400, y: 1600 })]
    #[case("down", Command::PointerDown { x: 0, y: 0 })]
    #[case("uiready", Command::UiReady)]
    #[case("reopen 3", Command::Reopen { user_id: Some(3) })]
    #[case("exit", Command::Quit)]
    fn test_parse_session_commands(#[case] line: &str, #[case] expected: Command) {
        assert_eq!(parse(line).unwrap(), Some(expected));
    }

    #[test]
    fn test_parse_operation_arguments() {
        assert_eq!(
            parse("enroll 3 99").unwrap(),
            Some(Command::Submit(
                OperationId(3),
                OperationKind::Enroll {
                    token: HardwareAuthToken::for_challenge(99)
                }
            ))
        );
        assert_eq!(
            parse("remove 4 1,2").unwrap(),
            Some(Command::Submit(
                OperationId(4),
                OperationKind::RemoveEnrollments {
                    enrollment_ids: vec![1, 2]
                }
            ))
        );
    }

    #[test]
    fn test_parse_forwards_service_commands() {
        assert_eq!(
            parse("set enrollment_hit=1").unwrap(),
            Some(Command::Service(vec![
                "set".to_string(),
                "enrollment_hit=1".to_string()
            ]))
        );
    }

    #[rstest]
    #[case("")]
    #[case("   ")]
    #[case("# comment")]
    fn test_parse_skips_blank(#[case] line: &str) {
        assert_eq!(parse(line).unwrap(), None);
    }

    #[rstest]
    #[case("auth")]
    #[case("auth x")]
    #[case("revoke 1")]
    #[case("down 1")]
    #[case("remove 1 a,b")]
    fn test_parse_errors(#[case] line: &str) {
        assert!(parse(line).is_err());
    }
}
