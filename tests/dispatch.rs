
use smallchat::broadcast::broadcast;
use smallchat::dispatch::{format_chat_line, Command, Input, UNSUPPORTED_COMMAND_MSG};
use smallchat::{ClientRegistry, Dispatcher, Outcome};
use test_helper::MemConn;

const MAX_LINE_LEN: usize = 256;

// Registry with peers at the given handles; returns their connections in the
// same order.
fn setup(handles: &[usize]) -> (ClientRegistry<MemConn>, Vec<MemConn>) {
    let mut registry = ClientRegistry::new(16);
    let conns = handles
        .iter()
        .map(|&handle| {
            let conn = MemConn::new();
            registry.admit(handle, conn.clone()).unwrap();
            conn
        })
        .collect();
    (registry, conns)
}

// ============================================================================
// Parsing
// ============================================================================

#[test]
fn parse_chat_line_is_untouched() {
    assert_eq!(Input::parse(b"hello\r\n"), Input::Chat(b"hello\r\n"));
    assert_eq!(Input::parse(b""), Input::Chat(b""));
    assert_eq!(Input::parse(b" /nick bob"), Input::Chat(b" /nick bob"));
}

#[test]
fn parse_command_strips_line_end_and_splits_at_first_space() {
    assert_eq!(
        Input::parse(b"/nick bob\r\n"),
        Input::Command {
            name: b"nick",
            arg: Some(&b"bob"[..]),
        }
    );
    assert_eq!(
        Input::parse(b"/nick Bob the Builder\n"),
        Input::Command {
            name: b"nick",
            arg: Some(&b"Bob the Builder"[..]),
        }
    );
    assert_eq!(
        Input::parse(b"/nick\n"),
        Input::Command {
            name: b"nick",
            arg: None,
        }
    );
    assert_eq!(
        Input::parse(b"/nick \n"),
        Input::Command {
            name: b"nick",
            arg: Some(&b""[..]),
        }
    );
}

#[test]
fn only_nick_with_argument_is_supported() {
    assert_eq!(
        Command::from_parts(b"nick", Some(&b"bob"[..])),
        Command::Nick(b"bob".to_vec())
    );
    assert_eq!(Command::from_parts(b"nick", None), Command::Unsupported);
    assert_eq!(Command::from_parts(b"nick", Some(&b""[..])), Command::Unsupported);
    assert_eq!(Command::from_parts(b"quit", None), Command::Unsupported);
    assert_eq!(Command::from_parts(b"NICK", Some(&b"bob"[..])), Command::Unsupported);
}

#[test]
fn chat_line_is_truncated_to_max_len() {
    let line = format_chat_line(b"user:1", b"hi\n", MAX_LINE_LEN);
    assert_eq!(line, b"user:1> hi\n");

    let long = vec![b'x'; 400];
    let line = format_chat_line(b"user:1", &long, MAX_LINE_LEN);
    assert_eq!(line.len(), MAX_LINE_LEN - 1);
    assert!(line.starts_with(b"user:1> xxx"));

    // Exactly max_line_len bytes does not fit either.
    let msg = vec![b'y'; MAX_LINE_LEN - "ab> ".len()];
    assert_eq!(format_chat_line(b"ab", &msg, MAX_LINE_LEN).len(), MAX_LINE_LEN - 1);
}

// ============================================================================
// Dispatching
// ============================================================================

#[test]
fn chat_message_reaches_everyone_but_sender() {
    let (mut registry, conns) = setup(&[1, 4, 9]);
    let dispatcher = Dispatcher::new(MAX_LINE_LEN);

    let outcome = dispatcher.dispatch(&mut registry, 4, b"hello\n");
    assert_eq!(outcome, Outcome::Broadcast { delivered: 2 });

    assert_eq!(conns[0].written_str(), "user:4> hello\n");
    assert_eq!(conns[1].written_str(), "");
    assert_eq!(conns[2].written_str(), "user:4> hello\n");
}

#[test]
fn nick_change_affects_only_sender() {
    let (mut registry, conns) = setup(&[3, 7, 8]);
    let dispatcher = Dispatcher::new(MAX_LINE_LEN);

    let outcome = dispatcher.dispatch(&mut registry, 7, b"/nick bob\r\n");
    assert_eq!(
        outcome,
        Outcome::NickChanged {
            old: b"user:7".to_vec(),
            new: b"bob".to_vec(),
        }
    );
    // Renaming is silent.
    assert!(conns.iter().all(|c| c.written().is_empty()));

    dispatcher.dispatch(&mut registry, 7, b"hi\n");
    assert_eq!(conns[0].written_str(), "bob> hi\n");
    assert_eq!(conns[2].written_str(), "bob> hi\n");

    dispatcher.dispatch(&mut registry, 3, b"hey\n");
    assert_eq!(conns[1].written_str(), "user:3> hey\n");
    assert_eq!(registry.get(8).unwrap().nick(), b"user:8");
}

#[test]
fn nick_is_kept_byte_for_byte() {
    let (mut registry, conns) = setup(&[0, 1]);
    let dispatcher = Dispatcher::new(MAX_LINE_LEN);

    dispatcher.dispatch(&mut registry, 0, b"/nick caf\xe9 \xff\n");
    assert_eq!(registry.get(0).unwrap().nick(), b"caf\xe9 \xff");

    dispatcher.dispatch(&mut registry, 0, b"hi\n");
    assert_eq!(conns[1].written(), b"caf\xe9 \xff> hi\n");
}

#[test]
fn nick_without_argument_is_rejected() {
    for line in [&b"/nick"[..], &b"/nick\n"[..], &b"/nick "[..], &b"/nick \r\n"[..]] {
        let (mut registry, conns) = setup(&[0, 1]);
        let dispatcher = Dispatcher::new(MAX_LINE_LEN);

        let outcome = dispatcher.dispatch(&mut registry, 0, line);
        assert_eq!(outcome, Outcome::Rejected);
        assert_eq!(conns[0].written(), UNSUPPORTED_COMMAND_MSG);
        assert!(conns[1].written().is_empty());
        assert_eq!(registry.get(0).unwrap().nick(), b"user:0");
    }
}

#[test]
fn unknown_command_is_rejected() {
    let (mut registry, conns) = setup(&[0, 1]);
    let dispatcher = Dispatcher::new(MAX_LINE_LEN);

    let outcome = dispatcher.dispatch(&mut registry, 1, b"/quit\n");
    assert_eq!(outcome, Outcome::Rejected);
    assert_eq!(conns[1].written(), UNSUPPORTED_COMMAND_MSG);
    assert!(conns[0].written().is_empty());
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.get(1).unwrap().nick(), b"user:1");
}

#[test]
fn message_from_unknown_peer_is_ignored() {
    let (mut registry, conns) = setup(&[0]);
    let dispatcher = Dispatcher::new(MAX_LINE_LEN);

    assert_eq!(
        dispatcher.dispatch(&mut registry, 5, b"hello\n"),
        Outcome::Ignored
    );
    assert!(conns[0].written().is_empty());
}

#[test]
fn long_chat_message_is_truncated_on_the_wire() {
    let (mut registry, conns) = setup(&[0, 1]);
    let dispatcher = Dispatcher::new(32);

    dispatcher.dispatch(&mut registry, 0, &[b'z'; 100]);
    assert_eq!(conns[1].written().len(), 31);
}

// ============================================================================
// Broadcast
// ============================================================================

#[test]
fn broadcast_without_exclusion_reaches_everyone() {
    let (mut registry, conns) = setup(&[2, 5]);

    assert_eq!(broadcast(&mut registry, None, b"server going down\n"), 2);
    for conn in &conns {
        assert_eq!(conn.written_str(), "server going down\n");
    }
}

#[test]
fn broadcast_skips_full_sockets_silently() {
    let mut registry = ClientRegistry::new(4);
    let ok = MemConn::new();
    let full = MemConn::blocked();
    registry.admit(0, full.clone()).unwrap();
    registry.admit(1, ok.clone()).unwrap();

    assert_eq!(broadcast(&mut registry, None, b"ping\n"), 1);
    assert!(full.written().is_empty());
    assert_eq!(ok.written_str(), "ping\n");
    assert_eq!(registry.len(), 2);
}
