//! The server session state machine (§4.4): which verbs are allowed per state, and the pure
//! state transition on a successfully-dispatched command.
//!
//! `Data` never appears as a value held between command reads — processing `DATA`/`BDAT LAST`
//! happens synchronously inside the command's own dispatch and returns straight to
//! [`State::Greeted`], matching the table's note that `Data` is "transient during body
//! ingest".

use crate::command::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum State {
    #[default]
    New,
    Greeted,
    Mail,
    Rcpt,
}

impl State {
    /// Whether `command` is in the allowed set for this state (§4.4's table). Does not
    /// account for submission-mode gating of MAIL — that is a policy check layered on top,
    /// not a state-machine ordering rule, and is applied separately by the session.
    pub fn allows(self, command: &Command) -> bool {
        use Command::*;
        match self {
            Self::New => matches!(command, Ehlo(_) | Helo(_) | Noop | Rset | Quit),
            Self::Greeted => matches!(
                command,
                Ehlo(_) | Helo(_) | Mail { .. } | Auth { .. } | StartTls | Vrfy(_) | Noop | Rset | Quit
            ),
            Self::Mail => matches!(command, Rcpt { .. } | Rset | Noop | Quit),
            Self::Rcpt => matches!(command, Rcpt { .. } | Data | Bdat { .. } | Rset | Noop | Quit),
        }
    }

    /// The state to move to after a command that this state allows and that the session
    /// accepted (i.e. no early handler/policy rejection). Terminal verbs (`QUIT`, a rejected
    /// `STARTTLS`/`AUTH`) are handled by the caller, not by this pure transition.
    pub fn next(self, command: &Command) -> Self {
        use Command::*;
        match command {
            Ehlo(_) | Helo(_) => Self::Greeted,
            Mail { .. } => Self::Mail,
            Rcpt { .. } => Self::Rcpt,
            Data => Self::Greeted,
            Bdat { last: true, .. } => Self::Greeted,
            Bdat { last: false, .. } => Self::Rcpt,
            Rset => {
                if self == Self::New {
                    Self::New
                } else {
                    Self::Greeted
                }
            }
            _ => self,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use smtp_common::ReversePath;

    fn mail() -> Command {
        Command::Mail { path: ReversePath::Null, params: Default::default() }
    }

    #[test]
    fn new_state_rejects_mail() {
        assert!(!State::New.allows(&mail()));
    }

    #[test]
    fn any_command_not_in_allowed_set_is_rejected() {
        // §8 "State machine" invariant, spot-checked across every state.
        assert!(!State::New.allows(&Command::StartTls));
        assert!(!State::Mail.allows(&Command::StartTls));
        assert!(!State::Rcpt.allows(&mail()));
    }

    #[test]
    fn greeted_allows_mail_and_transitions() {
        assert!(State::Greeted.allows(&mail()));
        assert_eq!(State::Greeted.next(&mail()), State::Mail);
    }

    #[test]
    fn rset_from_new_is_a_no_op() {
        assert_eq!(State::New.next(&Command::Rset), State::New);
    }

    #[test]
    fn rset_from_transaction_returns_to_greeted() {
        assert_eq!(State::Mail.next(&Command::Rset), State::Greeted);
        assert_eq!(State::Rcpt.next(&Command::Rset), State::Greeted);
    }

    #[test]
    fn data_and_bdat_last_return_to_greeted() {
        assert_eq!(State::Rcpt.next(&Command::Data), State::Greeted);
        assert_eq!(State::Rcpt.next(&Command::Bdat { size: 1, last: true }), State::Greeted);
    }

    #[test]
    fn bdat_non_last_stays_in_rcpt() {
        assert_eq!(State::Rcpt.next(&Command::Bdat { size: 1, last: false }), State::Rcpt);
    }

    #[test]
    fn two_sequential_transactions_without_rset() {
        let mut state = State::Greeted;
        state = state.next(&mail());
        assert_eq!(state, State::Mail);
        let rcpt = Command::Rcpt {
            path: smtp_common::ForwardPath(smtp_common::Mailbox {
                local_part: "b".into(),
                domain: "y".into(),
            }),
            params: Default::default(),
        };
        state = state.next(&rcpt);
        assert_eq!(state, State::Rcpt);
        state = state.next(&Command::Data);
        assert_eq!(state, State::Greeted);
        // Second transaction, no RSET in between.
        state = state.next(&mail());
        assert_eq!(state, State::Mail);
    }
}
