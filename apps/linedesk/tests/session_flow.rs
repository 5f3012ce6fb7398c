mod support;

use linedesk_core::{PrimaryAction, Session, StatusTone};
use linedesk_sdk::LineState;
use serde_json::json;
use support::{StubServer, eventually};

#[tokio::test]
async fn push_after_bulk_load_drives_the_board() {
    let server = StubServer::start().await;
    server.set_lines(json!([{ "line_id": 1, "state": "idle" }])).await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(server.config(dir.path())).await.unwrap();

    server.wait_for_subscriptions(1).await;
    eventually("line 1 rendered", || {
        session.views().get(&1).is_some_and(|view| view.status == "Available")
    })
    .await;

    server.push(
        "line_status",
        json!({ "line_id": 1, "state": "dialing", "phone_number": "5551234" }),
    );
    eventually("dialing view", || {
        session
            .views()
            .get(&1)
            .is_some_and(|view| view.status == "Dialing 5551234...")
    })
    .await;

    let view = session.views()[&1].clone();
    assert_eq!(view.action, PrimaryAction::Hangup);
    assert_eq!(view.tone, StatusTone::Active);
    session.shutdown().await;
}

#[tokio::test]
async fn dial_waits_for_the_push_before_changing_state() {
    let server = StubServer::start().await;
    server.set_lines(json!([{ "line_id": 2, "state": "idle" }])).await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(server.config(dir.path())).await.unwrap();
    server.wait_for_subscriptions(1).await;

    let ack = session.dispatcher().dial(2, " 5550100 ").await.unwrap();
    assert_eq!(ack.status.as_deref(), Some("dialing"));
    assert_eq!(session.store().get(2).unwrap().state, LineState::Idle);

    let requests = server.requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].path, "/api/lines/2/dial");
    assert_eq!(requests[0].body, json!({ "phone_number": "5550100" }));

    server.push(
        "line_status",
        json!({ "line_id": 2, "state": "connected", "phone_number": "5550100", "duration": 0 }),
    );
    eventually("connected state", || {
        session.store().get(2).is_some_and(|line| line.state == LineState::Connected)
    })
    .await;
    assert_eq!(session.dispatcher().recent_numbers(), vec!["5550100"]);
    session.shutdown().await;
}

#[tokio::test]
async fn channel_change_is_optimistic_and_survives_the_echo() {
    let server = StubServer::start().await;
    server
        .set_lines(json!([{ "line_id": 3, "state": "connected", "audio_channel": 1 }]))
        .await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(server.config(dir.path())).await.unwrap();
    server.wait_for_subscriptions(1).await;

    session.dispatcher().set_channel(3, 5).await.unwrap();
    assert_eq!(session.store().get(3).unwrap().audio_channel, Some(5));
    assert_eq!(
        server.requests().await[0].body,
        json!({ "channel": 5 })
    );

    server.push("line_status", json!({ "line_id": 3, "audio_channel": 5 }));
    server.push("line_status", json!({ "line_id": 3, "duration": 42 }));
    eventually("duration pushed", || {
        session.store().get(3).is_some_and(|line| line.duration_seconds >= 42)
    })
    .await;
    let line = session.store().get(3).unwrap();
    assert_eq!(line.audio_channel, Some(5));
    assert_eq!(line.state, LineState::Connected);
    session.shutdown().await;
}

#[tokio::test]
async fn reconnect_reloads_every_line() {
    let server = StubServer::start().await;
    server.set_lines(json!([{ "line_id": 1, "state": "idle" }])).await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(server.config(dir.path())).await.unwrap();
    server.wait_for_subscriptions(1).await;

    server
        .set_lines(json!([
            { "line_id": 1, "state": "ringing", "phone_number": "5557777" },
            { "line_id": 2, "state": "idle" }
        ]))
        .await;
    server.kick();
    server.wait_for_subscriptions(2).await;

    eventually("reloaded lines", || {
        session.store().len() == 2
            && session
                .store()
                .get(1)
                .is_some_and(|line| line.state == LineState::Ringing)
    })
    .await;
    eventually("ringing view", || {
        session
            .views()
            .get(&1)
            .is_some_and(|view| view.status == "Ringing 5557777..." && view.tone == StatusTone::Ringing)
    })
    .await;
    session.shutdown().await;
}

#[tokio::test]
async fn registration_pushes_are_kept_per_account() {
    let server = StubServer::start().await;
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(server.config(dir.path())).await.unwrap();
    server.wait_for_subscriptions(1).await;

    server.push(
        "sip_registration",
        json!({ "account": "1001", "registered": false }),
    );
    server.push(
        "sip_registration",
        json!({ "account": "1001", "registered": true }),
    );
    eventually("registration tracked", || {
        session
            .registrations()
            .get("1001")
            .is_some_and(|info| info.registered == Some(true))
    })
    .await;
    assert_eq!(session.registrations().len(), 1);
    session.shutdown().await;
}
