//! Controller tests against the scripted in-memory gateway.

mod common;

use common::{controller_with, pdf, quiz_json, ReplyScript, ScriptedGateway};
use source_analyst::config::Config;
use source_analyst::controller::{Event, Update};
use source_analyst::conversation::Origin;
use source_analyst::error::{QuizRejected, SubmitRejected};
use source_analyst::session::{CHAT_ERROR_TEXT, QUIZ_ERROR_TEXT};
use source_analyst::SENTINEL;

#[tokio::test]
async fn test_submit_streams_reply_and_captures_facts() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::ok(&[
        "Summary",
        "Summary\n:::WORKSPACE_SAVE: revenue grew 12% [Page 4]",
        "Summary\n:::WORKSPACE_SAVE: revenue grew 12% [Page 4]\nDetails follow.",
    ]));
    let mut ctl = controller_with(gateway.clone(), &Config::default());
    ctl.select_attachment(pdf("report.pdf"));

    let turn_id = ctl.submit("What happened to revenue?").expect("accepted");
    let updates = ctl.run_until_idle().await;

    assert!(matches!(updates.last(), Some(Update::ReplyFinished { failed: false, .. })));
    let turn = ctl.session().conversation().get(turn_id).expect("turn");
    assert_eq!(turn.display_text, "Summary\nDetails follow.");
    assert!(!turn.in_streaming);
    assert_eq!(ctl.session().notes().records().len(), 1);
    assert!(ctl
        .session()
        .notes()
        .text()
        .contains("revenue grew 12% [Page 4]"));
    for update in &updates {
        if let Update::Reply { text, .. } = update {
            assert!(!text.contains(SENTINEL));
        }
    }
}

#[tokio::test]
async fn test_first_request_inlines_attachment_then_replays_history() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::ok(&["first answer"]));
    gateway.push_reply(ReplyScript::ok(&["second answer"]));
    let mut ctl = controller_with(gateway.clone(), &Config::default());
    ctl.select_attachment(pdf("report.pdf"));

    ctl.submit("one").expect("accepted");
    ctl.run_until_idle().await;
    ctl.submit("two").expect("accepted");
    ctl.run_until_idle().await;

    let calls = gateway.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[0].attachment.as_deref(), Some("report.pdf"));
    assert!(calls[0].prior.is_empty());
    assert!(calls[1].attachment.is_none());
    assert_eq!(calls[1].prior.len(), 1);
    assert_eq!(calls[1].prior[0].user, "one");
    assert_eq!(calls[1].prior[0].model, "first answer");
    assert_eq!(calls[0].session, calls[1].session);
}

#[tokio::test]
async fn test_stream_error_finalizes_with_message() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::failing(
        &[":::WORKSPACE_SAVE: kept\npartial"],
        "connection reset",
    ));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("report.pdf"));

    let turn_id = ctl.submit("q").expect("accepted");
    let updates = ctl.run_until_idle().await;

    assert!(matches!(updates.last(), Some(Update::ReplyFinished { failed: true, .. })));
    let turn = ctl.session().conversation().get(turn_id).expect("turn");
    assert_eq!(turn.display_text, CHAT_ERROR_TEXT);
    assert!(!turn.in_streaming);
    assert!(ctl.session().notes().text().contains("kept"));
    assert!(!ctl.is_busy());
}

#[tokio::test]
async fn test_busy_submissions_are_rejected() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::ok(&["slow"]));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("report.pdf"));

    ctl.submit("first").expect("accepted");
    assert_eq!(ctl.submit("second").unwrap_err(), SubmitRejected::Busy);
    assert_eq!(ctl.generate_quiz().unwrap_err(), QuizRejected::Busy);
    ctl.run_until_idle().await;
    assert_eq!(ctl.session().conversation().len(), 3);
}

#[tokio::test]
async fn test_empty_submission_rules() {
    let gateway = ScriptedGateway::new();
    let mut ctl = controller_with(gateway, &Config::default());
    assert_eq!(ctl.submit("").unwrap_err(), SubmitRejected::NothingToSend);
    assert!(ctl.session().conversation().is_empty());

    ctl.select_attachment(pdf("report.pdf"));
    assert!(ctl.submit("").is_ok());
    ctl.run_until_idle().await;
}

#[tokio::test]
async fn test_replacing_attachment_discards_queued_increments() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::ok(&[
        "old text",
        "old text\n:::WORKSPACE_SAVE: stale fact\n",
        "old text\n:::WORKSPACE_SAVE: stale fact\nmore old text",
    ]));
    let mut ctl = controller_with(gateway.clone(), &Config::default());
    ctl.select_attachment(pdf("a.pdf"));
    ctl.submit("q").expect("accepted");

    let first = ctl.next_event().await.expect("event");
    assert!(matches!(ctl.handle(first), Update::Reply { .. }));

    ctl.select_attachment(pdf("b.pdf"));
    assert!(!ctl.is_busy());

    // Whatever the aborted task managed to queue must not land.
    while let Ok(Some(event)) =
        tokio::time::timeout(std::time::Duration::from_millis(50), ctl.next_event()).await
    {
        assert_eq!(ctl.handle(event), Update::Ignored);
    }

    let session = ctl.session();
    assert_eq!(session.notes().text(), "# Analysis: b.pdf\n\n");
    assert!(session.notes().records().is_empty());
    assert_eq!(session.conversation().len(), 1);
    assert_eq!(session.conversation().turns()[0].origin, Origin::System);
    assert!(session
        .conversation()
        .turns()
        .iter()
        .all(|t| !t.display_text.contains("old text")));
    assert_eq!(gateway.discarded().len(), 2);
}

#[tokio::test]
async fn test_clear_attachment_resets_session() {
    let gateway = ScriptedGateway::new();
    gateway.push_reply(ReplyScript::ok(&["answer"]));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));
    ctl.submit("q").expect("accepted");
    ctl.run_until_idle().await;

    ctl.clear_attachment();
    assert!(ctl.session().attachment().is_none());
    assert!(ctl.session().conversation().is_empty());
    assert_eq!(ctl.session().notes().text(), "# Key Findings\n\n");
}

#[tokio::test]
async fn test_quiz_generation_starts_timer() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(quiz_json(20)));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));

    ctl.generate_quiz().expect("accepted");
    let updates = ctl.run_until_idle().await;
    assert_eq!(updates, vec![Update::QuizReady]);
    assert!(ctl.timer_running());
    let quiz = ctl.session().quiz().expect("quiz");
    assert_eq!(quiz.len(), 20);
    assert_eq!(quiz.format_remaining(), "15:00");

    ctl.close_quiz();
    assert!(!ctl.timer_running());
    assert!(ctl.session().quiz().is_none());
}

#[tokio::test]
async fn test_untimed_quiz_has_no_timer_task() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(quiz_json(2)));
    let config = Config {
        quiz_timer_enabled: false,
        ..Config::default()
    };
    let mut ctl = controller_with(gateway, &config);
    ctl.select_attachment(pdf("a.pdf"));
    ctl.generate_quiz().expect("accepted");
    ctl.run_until_idle().await;
    assert!(!ctl.timer_running());
    assert!(!ctl.session().quiz().expect("quiz").timer_enabled());
}

#[tokio::test]
async fn test_quiz_without_attachment_rejected() {
    let gateway = ScriptedGateway::new();
    let mut ctl = controller_with(gateway, &Config::default());
    assert_eq!(ctl.generate_quiz().unwrap_err(), QuizRejected::NoAttachment);
}

#[tokio::test]
async fn test_malformed_quiz_payload_appends_system_turn() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(serde_json::json!([{ "question": "Q", "options": ["only one"], "correctAnswerIndex": 0 }])));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));

    ctl.generate_quiz().expect("accepted");
    let updates = ctl.run_until_idle().await;
    assert_eq!(updates, vec![Update::QuizFailed]);
    assert!(ctl.session().quiz().is_none());
    let last = ctl.session().conversation().last().expect("turn");
    assert_eq!(last.origin, Origin::System);
    assert_eq!(last.display_text, QUIZ_ERROR_TEXT);
    assert!(!ctl.is_busy());
}

#[tokio::test]
async fn test_gateway_quiz_error_appends_system_turn() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Err("quota exceeded".into()));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));
    ctl.generate_quiz().expect("accepted");
    assert_eq!(ctl.run_until_idle().await, vec![Update::QuizFailed]);
}

#[tokio::test]
async fn test_countdown_expiry_completes_quiz() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(quiz_json(5)));
    let config = Config {
        quiz_time_budget_secs: 2,
        ..Config::default()
    };
    let mut ctl = controller_with(gateway, &config);
    ctl.select_attachment(pdf("a.pdf"));
    ctl.generate_quiz().expect("accepted");
    ctl.run_until_idle().await;

    let correct = ctl.session().quiz().expect("quiz").current().correct_answer_index;
    ctl.quiz_select(correct).expect("answer");
    assert!(ctl.quiz_advance());

    let serial = ctl.session().quiz_serial();
    assert_eq!(
        ctl.handle(Event::QuizTick { serial }),
        Update::QuizTick {
            remaining_seconds: 1,
            expired: false
        }
    );
    assert_eq!(
        ctl.handle(Event::QuizTick { serial }),
        Update::QuizTick {
            remaining_seconds: 0,
            expired: true
        }
    );
    assert!(!ctl.timer_running());
    let quiz = ctl.session().quiz().expect("quiz");
    assert!(quiz.is_completed());
    assert_eq!(quiz.score(), 1);
    assert_eq!(quiz.percentage(), 20);
}

#[tokio::test]
async fn test_tick_for_closed_quiz_is_ignored() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(quiz_json(1)));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));
    ctl.generate_quiz().expect("accepted");
    ctl.run_until_idle().await;
    let serial = ctl.session().quiz_serial();
    ctl.close_quiz();
    assert_eq!(ctl.handle(Event::QuizTick { serial }), Update::Ignored);
}

#[tokio::test]
async fn test_finishing_quiz_stops_timer() {
    let gateway = ScriptedGateway::new();
    gateway.push_quiz(Ok(quiz_json(1)));
    let mut ctl = controller_with(gateway, &Config::default());
    ctl.select_attachment(pdf("a.pdf"));
    ctl.generate_quiz().expect("accepted");
    ctl.run_until_idle().await;
    assert!(ctl.timer_running());

    ctl.quiz_select(0).expect("answer");
    assert!(ctl.quiz_advance());
    assert!(ctl.session().quiz().expect("quiz").is_completed());
    assert!(!ctl.timer_running());
}
