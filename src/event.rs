/// Protocol line classification.
///
/// One raw line becomes either a bare server command (PING, ERROR, ...) or
/// a prefixed channel/user-directed event (`:nick!host VERB dest ... :payload`).
/// Parsing is infallible — garbage lines classify as best they can and fall
/// through to the pass-through log template rather than erroring, since
/// protocol extensions and non-standard server behavior are expected.

/// A parsed protocol event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A line with no origin prefix, e.g. `PING :token`.
    ServerCommand { verb: String, args: Vec<String> },
    /// A line carrying an origin prefix.
    ChannelEvent {
        /// Nick portion of the source (before `!`).
        nick: String,
        /// Host portion of the source (after `!`), when present.
        host: Option<String>,
        verb: String,
        /// Destination from the header. JOIN resolves its destination from
        /// the payload instead — see [`Event::routed_line`].
        dest: Option<String>,
        /// Header tokens after the destination.
        args: Vec<String>,
        /// Trailing payload (after the first `:` past the prefix).
        payload: Option<String>,
        /// The original line, for pass-through formatting.
        raw: String,
    },
}

impl Event {
    /// Parse a single line (without its terminator). Never fails.
    pub fn parse(line: &str) -> Event {
        let Some(rest) = line.strip_prefix(':') else {
            let mut tokens = line.split_whitespace();
            let verb = tokens.next().unwrap_or_default().to_owned();
            let args = tokens.map(str::to_owned).collect();
            return Event::ServerCommand { verb, args };
        };

        let (header, payload) = match rest.split_once(':') {
            Some((header, payload)) => (header, Some(payload.to_owned())),
            None => (rest, None),
        };

        let mut tokens = header.split_whitespace();
        let source = tokens.next().unwrap_or_default();
        let verb = tokens.next().unwrap_or_default().to_owned();
        let dest = tokens.next().map(str::to_owned);
        let args: Vec<String> = tokens.map(str::to_owned).collect();

        let (nick, host) = match source.split_once('!') {
            Some((nick, host)) => (nick.to_owned(), Some(host.to_owned())),
            None => (source.to_owned(), None),
        };

        Event::ChannelEvent {
            nick,
            host,
            verb,
            dest,
            args,
            payload,
            raw: line.to_owned(),
        }
    }

    /// Resolve a channel event to its (destination, formatted log line).
    ///
    /// Returns `None` for server commands and for events with no resolvable
    /// destination (e.g. QUIT, which carries none) — such events are dropped
    /// by dispatch, never delivered.
    pub fn routed_line(&self) -> Option<(&str, String)> {
        let Event::ChannelEvent {
            nick,
            verb,
            dest,
            args,
            payload,
            raw,
            ..
        } = self
        else {
            return None;
        };

        let payload_str = payload.as_deref().unwrap_or_default();
        let (dest, line) = match verb.as_str() {
            // JOIN names its channel in the payload, not the header.
            "JOIN" => (payload.as_deref(), format!("> {nick} joined {payload_str}")),
            "PRIVMSG" => (dest.as_deref(), format!("<{nick}> {payload_str}")),
            "PART" => {
                let d = dest.as_deref().unwrap_or_default();
                (dest.as_deref(), format!("> {nick} left {d}"))
            }
            "QUIT" => (dest.as_deref(), format!("> {nick} quit")),
            "TOPIC" => (dest.as_deref(), format!("> {nick} set topic: {payload_str}")),
            "MODE" if args.len() >= 2 => {
                let line = format!("> {nick} set {} to {}", args[0], args[1..].join(" "));
                (dest.as_deref(), line)
            }
            _ => (dest.as_deref(), format!("|{raw}")),
        };

        dest.filter(|d| !d.is_empty()).map(|d| (d, line))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn routed(line: &str) -> Option<(String, String)> {
        let event = Event::parse(line);
        event
            .routed_line()
            .map(|(d, l)| (d.to_owned(), l))
    }

    // ── Server commands ──────────────────────────────────────────

    #[test]
    fn parse_server_command_verb_is_first_token() {
        let event = Event::parse("PING :irc.example.com");
        assert_eq!(
            event,
            Event::ServerCommand {
                verb: "PING".into(),
                args: vec![":irc.example.com".into()],
            }
        );
    }

    #[test]
    fn parse_error_command() {
        let event = Event::parse("ERROR :Closing Link");
        let Event::ServerCommand { verb, .. } = event else {
            panic!("expected server command");
        };
        assert_eq!(verb, "ERROR");
    }

    #[test]
    fn parse_empty_line() {
        assert_eq!(
            Event::parse(""),
            Event::ServerCommand {
                verb: String::new(),
                args: vec![],
            }
        );
    }

    #[test]
    fn server_commands_are_never_routed() {
        assert_eq!(routed("PING :token"), None);
    }

    // ── Channel events ───────────────────────────────────────────

    #[test]
    fn privmsg_resolves_dest_and_line() {
        assert_eq!(
            routed(":nick!user@host PRIVMSG #chan :hello there"),
            Some(("#chan".into(), "<nick> hello there".into()))
        );
    }

    #[test]
    fn join_dest_comes_from_payload() {
        assert_eq!(
            routed(":nick!user@host JOIN :#chan"),
            Some(("#chan".into(), "> nick joined #chan".into()))
        );
    }

    #[test]
    fn part_uses_header_dest() {
        assert_eq!(
            routed(":nick!user@host PART #chan"),
            Some(("#chan".into(), "> nick left #chan".into()))
        );
    }

    #[test]
    fn quit_has_no_destination() {
        assert_eq!(routed(":nick!user@host QUIT :gone fishing"), None);
    }

    #[test]
    fn topic_formats_payload() {
        assert_eq!(
            routed(":nick!user@host TOPIC #chan :new topic"),
            Some(("#chan".into(), "> nick set topic: new topic".into()))
        );
    }

    #[test]
    fn mode_with_two_args() {
        assert_eq!(
            routed(":nick!user@host MODE #chan +o bob"),
            Some(("#chan".into(), "> nick set +o to bob".into()))
        );
    }

    #[test]
    fn mode_with_many_args_joins_them() {
        assert_eq!(
            routed(":nick!user@host MODE #chan +ov bob carol"),
            Some(("#chan".into(), "> nick set +ov to bob carol".into()))
        );
    }

    #[test]
    fn mode_with_too_few_args_falls_through() {
        let line = ":nick!user@host MODE #chan";
        assert_eq!(
            routed(line),
            Some(("#chan".into(), format!("|{line}")))
        );
    }

    #[test]
    fn unknown_verb_falls_through_to_pass_through() {
        let line = ":irc.example.com 332 me #chan :the topic";
        // Destination resolves to "me" — not a joined channel, but routing
        // itself still succeeds; dispatch drops it.
        assert_eq!(routed(line), Some(("me".into(), format!("|{line}"))));
    }

    #[test]
    fn source_without_host_keeps_full_nick() {
        let event = Event::parse(":irc.example.com NOTICE * :Looking up");
        let Event::ChannelEvent { nick, host, .. } = event else {
            panic!("expected channel event");
        };
        assert_eq!(nick, "irc.example.com");
        assert_eq!(host, None);
    }

    #[test]
    fn malformed_prefix_does_not_panic() {
        assert_eq!(routed(":"), None);
        assert_eq!(routed("::payload"), None);
        assert_eq!(routed(":lonely"), None);
    }
}
