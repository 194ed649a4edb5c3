//! # Interactive question/answer channel
//!
//! The installer never reads the terminal directly. Whenever it needs something from the
//! user it builds an [`Interaction`] and hands it to an [`InteractionChannel`], which
//! forwards it to an [`InteractionDriver`] and blocks until the driver supplies an answer
//! that fits the interaction's grammar.
//!
//! ```text
//! Idle --present--> AwaitingAnswer --submit(valid)--> Idle --finish--> Terminal
//!                        |  ^
//!                        +--+ submit(invalid): ProtocolError, still awaiting
//! ```
//!
//! Only one question can be outstanding at a time. The same channel serves a person at a
//! terminal ([`TerminalDriver`]) and scripted drivers in tests.

use crate::libs::utilities::deadline::Deadline;
use crate::schemas::errors::{InstallError, ProtocolError};
use crate::log_debug;
use colored::Colorize;
use std::fmt;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

// ============================================================================
// INTERACTIONS AND ANSWERS
// ============================================================================

/// One option of an [`Interaction::InputQuestion`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Choice {
    /// Stable identifier returned in [`Answer::Choice`], e.g. `reinstall`.
    pub id: String,
    /// Shown to the user, e.g. `Reinstall`.
    pub label: String,
    /// Single-letter shortcut, e.g. `r`.
    pub key: char,
}

impl Choice {
    pub fn new(id: &str, label: &str, key: char) -> Self {
        Choice {
            id: id.to_string(),
            label: label.to_string(),
            key: key.to_ascii_lowercase(),
        }
    }
}

/// A typed prompt requiring at most one answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    /// Informational; no answer expected.
    DisplayMessage { text: String },
    /// Boolean question. With a default, an empty answer picks it.
    YesNo {
        question: String,
        default: Option<bool>,
    },
    /// Free-form text. With a default, an empty answer picks it.
    TextQuestion {
        question: String,
        default: Option<String>,
    },
    /// The user must type `accept_token` to accept; `n` or an empty answer declines.
    LicenseQuestion {
        framework: String,
        text: String,
        accept_token: String,
    },
    /// Pick one of `choices` by 1-based index or shortcut key.
    InputQuestion {
        question: String,
        choices: Vec<Choice>,
        default: Option<usize>,
    },
}

/// A validated answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Answer {
    /// A `DisplayMessage` was shown.
    Acknowledged,
    Bool(bool),
    Text(String),
    License { accepted: bool },
    /// Id of the selected [`Choice`].
    Choice(String),
}

impl Interaction {
    pub fn message(text: impl Into<String>) -> Self {
        Interaction::DisplayMessage { text: text.into() }
    }

    pub fn expects_answer(&self) -> bool {
        !matches!(self, Interaction::DisplayMessage { .. })
    }

    /// Text written to the driver. Prompts end with a space and no newline so the answer
    /// is typed on the same line.
    pub fn prompt(&self) -> String {
        match self {
            Interaction::DisplayMessage { text } => text.clone(),
            Interaction::YesNo { question, default } => {
                let options = match default {
                    Some(true) => "[Y/n]",
                    Some(false) => "[y/N]",
                    None => "[y/n]",
                };
                format!("{question} {options} ")
            }
            Interaction::TextQuestion { question, default } => match default {
                Some(d) => format!("{question}: {d}\nPress enter to accept, or type another value: "),
                None => format!("{question}: "),
            },
            Interaction::LicenseQuestion {
                text, accept_token, ..
            } => format!("{text}\n[I Accept ({accept_token})/I don't accept (N)] "),
            Interaction::InputQuestion {
                question,
                choices,
                default,
            } => {
                let rendered: Vec<String> = choices
                    .iter()
                    .enumerate()
                    .map(|(i, c)| {
                        let key = if Some(i) == *default {
                            c.key.to_ascii_uppercase()
                        } else {
                            c.key
                        };
                        format!("{} ({})", c.label, key)
                    })
                    .collect();
                format!("{question} [{}] ", rendered.join("/"))
            }
        }
    }

    /// Validates `raw` against this interaction's grammar.
    pub fn parse_answer(&self, raw: &str) -> Result<Answer, ProtocolError> {
        let trimmed = raw.trim();
        let invalid = |expected: &str| ProtocolError::InvalidAnswer {
            answer: trimmed.to_string(),
            expected: expected.to_string(),
        };

        match self {
            Interaction::DisplayMessage { .. } => Ok(Answer::Acknowledged),
            Interaction::YesNo { default, .. } => match trimmed.to_lowercase().as_str() {
                "y" | "yes" => Ok(Answer::Bool(true)),
                "n" | "no" => Ok(Answer::Bool(false)),
                "" => default.map(Answer::Bool).ok_or_else(|| invalid("y or n")),
                _ => Err(invalid("y or n")),
            },
            Interaction::TextQuestion { default, .. } => {
                if trimmed.is_empty() {
                    default
                        .clone()
                        .map(Answer::Text)
                        .ok_or_else(|| invalid("a non-empty value"))
                } else {
                    Ok(Answer::Text(trimmed.to_string()))
                }
            }
            Interaction::LicenseQuestion { accept_token, .. } => {
                if trimmed.eq_ignore_ascii_case(accept_token) {
                    Ok(Answer::License { accepted: true })
                } else if trimmed.is_empty() || trimmed.eq_ignore_ascii_case("n") {
                    Ok(Answer::License { accepted: false })
                } else {
                    Err(invalid(&format!("'{accept_token}' to accept or 'n' to decline")))
                }
            }
            Interaction::InputQuestion {
                choices, default, ..
            } => {
                let expected = format!(
                    "one of {} or 1-{}",
                    choices.iter().map(|c| c.key.to_string()).collect::<Vec<_>>().join(", "),
                    choices.len()
                );
                let picked = if trimmed.is_empty() {
                    default.and_then(|i| choices.get(i))
                } else if let Ok(index) = trimmed.parse::<usize>() {
                    index.checked_sub(1).and_then(|i| choices.get(i))
                } else {
                    let lower = trimmed.to_lowercase();
                    choices.iter().find(|c| {
                        (lower.len() == c.key.len_utf8() && lower.starts_with(c.key))
                            || lower == c.id.to_lowercase()
                    })
                };
                picked
                    .map(|c| Answer::Choice(c.id.clone()))
                    .ok_or_else(|| invalid(&expected))
            }
        }
    }
}

impl fmt::Display for Interaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Interaction::DisplayMessage { .. } => "DisplayMessage",
            Interaction::YesNo { .. } => "YesNo",
            Interaction::TextQuestion { .. } => "TextQuestion",
            Interaction::LicenseQuestion { .. } => "LicenseQuestion",
            Interaction::InputQuestion { .. } => "InputQuestion",
        };
        f.write_str(kind)
    }
}

// ============================================================================
// CHANNEL
// ============================================================================

/// Where the conversation stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelState {
    Idle,
    AwaitingAnswer(Interaction),
    Terminal { success: bool },
}

/// Strict question/answer alternation between the installer and a driver.
#[derive(Debug)]
pub struct InteractionChannel {
    state: ChannelState,
}

impl Default for InteractionChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionChannel {
    pub fn new() -> Self {
        InteractionChannel {
            state: ChannelState::Idle,
        }
    }

    pub fn state(&self) -> &ChannelState {
        &self.state
    }

    /// Puts `interaction` in front of the driver. Display messages need no answer and
    /// leave the channel idle.
    pub fn present(&mut self, interaction: Interaction) -> Result<(), ProtocolError> {
        match self.state {
            ChannelState::Idle => {}
            ChannelState::AwaitingAnswer(_) => return Err(ProtocolError::AlreadyAwaiting),
            ChannelState::Terminal { .. } => return Err(ProtocolError::Finished),
        }
        log_debug!("[Channel] Presenting {}", interaction.to_string().cyan());
        if interaction.expects_answer() {
            self.state = ChannelState::AwaitingAnswer(interaction);
        }
        Ok(())
    }

    /// Offers an answer to the outstanding question. A grammar error keeps the question
    /// outstanding so the driver can try again.
    pub fn submit(&mut self, raw: &str) -> Result<Answer, ProtocolError> {
        let answer = match &self.state {
            ChannelState::AwaitingAnswer(interaction) => interaction.parse_answer(raw)?,
            ChannelState::Idle => return Err(ProtocolError::NotAwaiting),
            ChannelState::Terminal { .. } => return Err(ProtocolError::Finished),
        };
        self.state = ChannelState::Idle;
        Ok(answer)
    }

    /// Ends the conversation.
    pub fn finish(&mut self, success: bool) {
        self.state = ChannelState::Terminal { success };
    }

    /// Presents `interaction`, then keeps asking `driver` until it produces a valid answer.
    /// Waiting longer than `timeout` in total is a timeout error.
    pub fn converse(
        &mut self,
        interaction: Interaction,
        driver: &mut dyn InteractionDriver,
        timeout: Duration,
    ) -> Result<Answer, InstallError> {
        self.present(interaction.clone())?;
        if !interaction.expects_answer() {
            driver.display(&interaction.prompt());
            return Ok(Answer::Acknowledged);
        }

        let deadline = Deadline::start(format!("waiting for an answer ({interaction})"), timeout);
        loop {
            if deadline.expired() {
                return Err(deadline.to_error());
            }
            match driver.ask(&interaction, deadline.remaining()) {
                DriverReply::Answer(raw) => match self.submit(&raw) {
                    Ok(answer) => {
                        log_debug!("[Channel] Answer accepted: {:?}", answer);
                        return Ok(answer);
                    }
                    Err(err) => {
                        log_debug!("[Channel] {}", err.to_string().yellow());
                        driver.rejected(&err);
                    }
                },
                DriverReply::TimedOut => return Err(deadline.to_error()),
                DriverReply::Closed => return Err(ProtocolError::DriverClosed.into()),
            }
        }
    }
}

// ============================================================================
// DRIVERS
// ============================================================================

/// What a driver came back with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DriverReply {
    Answer(String),
    TimedOut,
    Closed,
}

/// Something that answers interactions: a person at a terminal, or a script.
pub trait InteractionDriver {
    /// Shows an informational message.
    fn display(&mut self, text: &str);

    /// Shows `interaction` and waits at most `wait` for a raw answer.
    fn ask(&mut self, interaction: &Interaction, wait: Duration) -> DriverReply;

    /// Told when the last answer did not fit the grammar. The next `ask` re-asks.
    fn rejected(&mut self, error: &ProtocolError);
}

/// Prompts on stdout and reads answers from stdin, one line each.
///
/// Lines are read on a helper thread so that waiting for an answer can time out.
pub struct TerminalDriver {
    lines: Option<Receiver<io::Result<String>>>,
}

impl Default for TerminalDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalDriver {
    pub fn new() -> Self {
        TerminalDriver { lines: None }
    }

    fn lines(&mut self) -> &Receiver<io::Result<String>> {
        self.lines.get_or_insert_with(|| {
            let (tx, rx) = mpsc::channel();
            thread::spawn(move || {
                let stdin = io::stdin();
                for line in stdin.lock().lines() {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
            });
            rx
        })
    }

    fn write_stdout(text: &str) {
        let mut out = io::stdout().lock();
        let _ = out.write_all(text.as_bytes());
        let _ = out.flush();
    }
}

impl InteractionDriver for TerminalDriver {
    fn display(&mut self, text: &str) {
        Self::write_stdout(&format!("{text}\n"));
    }

    fn ask(&mut self, interaction: &Interaction, wait: Duration) -> DriverReply {
        Self::write_stdout(&interaction.prompt());
        match self.lines().recv_timeout(wait) {
            Ok(Ok(line)) => DriverReply::Answer(line),
            Ok(Err(_)) | Err(RecvTimeoutError::Disconnected) => DriverReply::Closed,
            Err(RecvTimeoutError::Timeout) => DriverReply::TimedOut,
        }
    }

    fn rejected(&mut self, error: &ProtocolError) {
        Self::write_stdout(&format!("{}\n", error.to_string().red()));
    }
}

/// Answers from a fixed script and records everything it was shown.
#[cfg(test)]
pub(crate) struct ScriptedDriver {
    answers: std::collections::VecDeque<String>,
    pub transcript: Vec<String>,
    pub asked: Vec<Interaction>,
}

#[cfg(test)]
impl ScriptedDriver {
    pub(crate) fn new(answers: &[&str]) -> Self {
        ScriptedDriver {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            transcript: Vec::new(),
            asked: Vec::new(),
        }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.answers.len()
    }
}

#[cfg(test)]
impl InteractionDriver for ScriptedDriver {
    fn display(&mut self, text: &str) {
        self.transcript.push(text.to_string());
    }

    fn ask(&mut self, interaction: &Interaction, _wait: Duration) -> DriverReply {
        self.transcript.push(interaction.prompt());
        self.asked.push(interaction.clone());
        match self.answers.pop_front() {
            Some(answer) => DriverReply::Answer(answer),
            None => DriverReply::Closed,
        }
    }

    fn rejected(&mut self, error: &ProtocolError) {
        self.transcript.push(error.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn yes_no() -> Interaction {
        Interaction::YesNo {
            question: "Continue?".to_string(),
            default: None,
        }
    }

    fn reinstall_question() -> Interaction {
        Interaction::InputQuestion {
            question: "Idea is already installed on your system, do you want to reinstall it anyway?"
                .to_string(),
            choices: vec![
                Choice::new("reinstall", "Reinstall", 'r'),
                Choice::new("cancel", "Cancel", 'c'),
            ],
            default: Some(1),
        }
    }

    #[test]
    fn invalid_yes_no_keeps_question_outstanding() {
        let mut channel = InteractionChannel::new();
        channel.present(yes_no()).unwrap();

        let err = channel.submit("maybe").unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidAnswer { .. }));
        assert_eq!(channel.state(), &ChannelState::AwaitingAnswer(yes_no()));

        assert_eq!(channel.submit("y").unwrap(), Answer::Bool(true));
        assert_eq!(channel.state(), &ChannelState::Idle);
    }

    #[test]
    fn no_answer_while_idle() {
        let mut channel = InteractionChannel::new();
        assert_eq!(channel.submit("y").unwrap_err(), ProtocolError::NotAwaiting);

        channel.present(yes_no()).unwrap();
        channel.submit("n").unwrap();
        // Answering the same question twice.
        assert_eq!(channel.submit("n").unwrap_err(), ProtocolError::NotAwaiting);
    }

    #[test]
    fn never_two_outstanding_questions() {
        let mut channel = InteractionChannel::new();
        channel.present(yes_no()).unwrap();
        assert_eq!(
            channel.present(reinstall_question()).unwrap_err(),
            ProtocolError::AlreadyAwaiting
        );
        assert_eq!(channel.state(), &ChannelState::AwaitingAnswer(yes_no()));
    }

    #[test]
    fn display_messages_need_no_answer() {
        let mut channel = InteractionChannel::new();
        channel.present(Interaction::message("hello")).unwrap();
        assert_eq!(channel.state(), &ChannelState::Idle);
    }

    #[test]
    fn finished_channel_rejects_everything() {
        let mut channel = InteractionChannel::new();
        channel.finish(true);
        assert_eq!(channel.present(yes_no()).unwrap_err(), ProtocolError::Finished);
        assert_eq!(channel.submit("y").unwrap_err(), ProtocolError::Finished);
    }

    #[rstest]
    #[case("", Some("cancel"))]
    #[case("r", Some("reinstall"))]
    #[case("R", Some("reinstall"))]
    #[case("1", Some("reinstall"))]
    #[case("2", Some("cancel"))]
    #[case("cancel", Some("cancel"))]
    #[case("3", None)]
    #[case("x", None)]
    fn choice_grammar(#[case] raw: &str, #[case] expected: Option<&str>) {
        let parsed = reinstall_question().parse_answer(raw);
        match expected {
            Some(id) => assert_eq!(parsed.unwrap(), Answer::Choice(id.to_string())),
            None => assert!(parsed.is_err()),
        }
    }

    #[rstest]
    #[case("a", Some(true))]
    #[case("A", Some(true))]
    #[case("n", Some(false))]
    #[case("", Some(false))]
    #[case("yes", None)]
    fn license_grammar(#[case] raw: &str, #[case] expected: Option<bool>) {
        let license = Interaction::LicenseQuestion {
            framework: "Eclipse".to_string(),
            text: "EPL".to_string(),
            accept_token: "a".to_string(),
        };
        match expected {
            Some(accepted) => assert_eq!(
                license.parse_answer(raw).unwrap(),
                Answer::License { accepted }
            ),
            None => assert!(license.parse_answer(raw).is_err()),
        }
    }

    #[test]
    fn text_question_defaults() {
        let question = Interaction::TextQuestion {
            question: "Choose installation path".to_string(),
            default: Some("/opt/idea".to_string()),
        };
        assert_eq!(question.parse_answer("").unwrap(), Answer::Text("/opt/idea".to_string()));
        assert_eq!(
            question.parse_answer("  /tmp/idea \n").unwrap(),
            Answer::Text("/tmp/idea".to_string())
        );
        assert!(question.prompt().starts_with("Choose installation path: /opt/idea"));
    }

    #[test]
    fn prompt_marks_default_choice() {
        assert!(reinstall_question()
            .prompt()
            .ends_with("[Reinstall (r)/Cancel (C)] "));
    }

    #[test]
    fn converse_retries_after_protocol_error() {
        let mut channel = InteractionChannel::new();
        let mut driver = ScriptedDriver::new(&["maybe", "n"]);

        let answer = channel
            .converse(yes_no(), &mut driver, Duration::from_secs(5))
            .unwrap();

        assert_eq!(answer, Answer::Bool(false));
        assert_eq!(driver.asked.len(), 2);
        assert!(driver.transcript.iter().any(|l| l.contains("invalid answer 'maybe'")));
    }

    #[test]
    fn converse_reports_closed_driver() {
        let mut channel = InteractionChannel::new();
        let mut driver = ScriptedDriver::new(&[]);
        let err = channel
            .converse(yes_no(), &mut driver, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.kind(), "ProtocolError");
    }

    #[test]
    fn converse_times_out() {
        struct Silent;
        impl InteractionDriver for Silent {
            fn display(&mut self, _: &str) {}
            fn ask(&mut self, _: &Interaction, _: Duration) -> DriverReply {
                DriverReply::TimedOut
            }
            fn rejected(&mut self, _: &ProtocolError) {}
        }
        let mut channel = InteractionChannel::new();
        let err = channel
            .converse(yes_no(), &mut Silent, Duration::from_secs(5))
            .unwrap_err();
        assert_eq!(err.kind(), "TimeoutError");
    }
}
