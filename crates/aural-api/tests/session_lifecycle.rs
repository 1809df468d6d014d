mod common;

use std::time::Duration;

use aural_api::CleanupSupervisor;
use aural_models::{IceCandidate, PeerState, SessionDescription, SessionState};
use aural_rtc::{ChannelTrack, PeerEvent};
use aural_vision::VideoFrame;

use common::{manager, offer, FAKE_ANSWER_SDP, MALFORMED_MARKER};

fn candidate() -> IceCandidate {
    IceCandidate {
        candidate: "candidate:1 1 UDP 2122252543 192.168.1.20 54321 typ host".to_string(),
        sdp_mid: Some("0".to_string()),
        sdp_mline_index: Some(0),
    }
}

/// Poll until `check` holds or the deadline passes.
async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}

#[tokio::test]
async fn test_offer_is_answered() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;
    assert_eq!(sessions.session_state(&id).await, Some(SessionState::Connected));

    let answer = sessions.handle_offer(&id, offer()).await.unwrap();

    assert_eq!(answer, SessionDescription::answer(FAKE_ANSWER_SDP));
    assert_eq!(sessions.session_state(&id).await, Some(SessionState::Negotiating));
    assert_eq!(connector.created(), 1);
    assert_eq!(connector.peer(0).remote_descriptions(), vec![offer()]);
    assert_eq!(sessions.peer_count().await, 1);
}

#[tokio::test]
async fn test_second_offer_leaves_single_peer() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;

    sessions.handle_offer(&id, offer()).await.unwrap();
    sessions
        .on_peer_event(&id, 1, PeerEvent::DataChannel { label: "detections".into() })
        .await;
    assert_eq!(sessions.session_state(&id).await, Some(SessionState::Active));

    sessions.handle_offer(&id, offer()).await.unwrap();

    assert_eq!(connector.created(), 2);
    assert!(connector.peer(0).is_closed());
    assert!(!connector.peer(1).is_closed());
    assert_eq!(sessions.peer_count().await, 1);
    assert_eq!(sessions.data_channel(&id).await, None);
}

#[tokio::test]
async fn test_failed_offer_keeps_prior_state() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;

    let bad = SessionDescription::offer(format!("v=0 {}", MALFORMED_MARKER));
    let err = tokio_test::assert_err!(sessions.handle_offer(&id, bad).await);

    assert!(!err.is_stale());
    assert_eq!(sessions.session_state(&id).await, Some(SessionState::Connected));
    assert_eq!(sessions.peer_count().await, 0);
    assert!(connector.peer(0).is_closed());
}

#[tokio::test]
async fn test_offer_for_unknown_session() {
    let (sessions, connector) = manager();
    let id = aural_models::SessionId::from_string("never-connected");

    let err = sessions.handle_offer(&id, offer()).await.unwrap_err();

    assert!(err.is_stale());
    assert_eq!(connector.created(), 0);
}

#[tokio::test]
async fn test_candidate_reaches_peer() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    tokio_test::assert_ok!(sessions.handle_ice_candidate(&id, candidate()).await);

    assert_eq!(connector.peer(0).candidates(), vec![candidate()]);
}

#[tokio::test]
async fn test_candidate_before_offer_is_stale() {
    let (sessions, _connector) = manager();
    let (id, _results) = sessions.connect().await;

    let err = sessions.handle_ice_candidate(&id, candidate()).await.unwrap_err();
    assert!(err.is_stale());

    let err = sessions
        .handle_answer(&id, SessionDescription::answer("v=0"))
        .await
        .unwrap_err();
    assert!(err.is_stale());
}

#[tokio::test]
async fn test_cleanup_removes_failed_session() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    let supervisor = CleanupSupervisor::new(sessions.clone(), Duration::from_secs(30));
    assert_eq!(supervisor.sweep_once().await, 0);

    connector.peer(0).set_state(PeerState::Failed);
    assert_eq!(supervisor.sweep_once().await, 1);
    assert_eq!(sessions.session_count().await, 0);
    assert!(connector.peer(0).is_closed());

    // Late messages for the removed session are dropped, not raised
    let err = sessions.handle_ice_candidate(&id, candidate()).await.unwrap_err();
    assert!(err.is_stale());
    let err = sessions
        .handle_answer(&id, SessionDescription::answer("v=0"))
        .await
        .unwrap_err();
    assert!(err.is_stale());
    assert!(connector.peer(0).candidates().is_empty());
}

#[tokio::test]
async fn test_cleanup_ignores_sessions_without_peer() {
    let (sessions, _connector) = manager();
    let _first = sessions.connect().await;
    let _second = sessions.connect().await;

    let supervisor = CleanupSupervisor::new(sessions.clone(), Duration::from_secs(30));
    assert_eq!(supervisor.sweep_once().await, 0);
    assert_eq!(sessions.session_count().await, 2);
}

#[tokio::test]
async fn test_peer_failure_event_removes_session() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    connector
        .events(0)
        .send(PeerEvent::StateChanged(PeerState::Failed))
        .await
        .unwrap();

    let sessions_ref = sessions.clone();
    assert!(eventually(|| {
        let sessions = sessions_ref.clone();
        async move { sessions.session_count().await == 0 }
    })
    .await);
    let peer = connector.peer(0);
    assert!(eventually(|| {
        let peer = peer.clone();
        async move { peer.is_closed() }
    })
    .await);
}

#[tokio::test]
async fn test_disconnected_state_is_only_logged() {
    let (sessions, _connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    sessions
        .on_peer_event(&id, 1, PeerEvent::StateChanged(PeerState::Disconnected))
        .await;

    assert_eq!(sessions.session_count().await, 1);
}

#[tokio::test]
async fn test_events_from_replaced_peer_are_ignored() {
    let (sessions, _connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();
    sessions.handle_offer(&id, offer()).await.unwrap();

    sessions
        .on_peer_event(&id, 1, PeerEvent::StateChanged(PeerState::Failed))
        .await;

    assert_eq!(sessions.session_count().await, 1);
    assert_eq!(sessions.peer_count().await, 1);
}

#[tokio::test]
async fn test_disconnect_closes_peer() {
    let (sessions, connector) = manager();
    let (id, _results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    sessions.disconnect(&id).await;

    assert_eq!(sessions.session_count().await, 0);
    assert!(connector.peer(0).is_closed());
    // A second disconnect is harmless
    sessions.disconnect(&id).await;
}

#[tokio::test]
async fn test_track_results_reach_client() {
    let (sessions, connector) = manager();
    let (id, mut results) = sessions.connect().await;
    sessions.handle_offer(&id, offer()).await.unwrap();

    let (frames, track) = ChannelTrack::channel("video0", 4);
    connector
        .events(0)
        .send(PeerEvent::Track(Box::new(track)))
        .await
        .unwrap();
    frames.send(VideoFrame::blank(640, 480)).await.unwrap();

    let result = tokio::time::timeout(Duration::from_secs(5), results.next())
        .await
        .expect("no result within timeout")
        .expect("result channel closed");

    assert_eq!(result.detections.len(), 1);
    let chair = &result.detections[0];
    assert_eq!(chair.label, "chair");
    let distance = chair.distance.expect("chair has a reference height");
    assert!((distance - 1.6628).abs() < 0.001, "got {}", distance);
    assert_eq!(sessions.session_state(&id).await, Some(SessionState::Active));
}
