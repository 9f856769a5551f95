//! End-to-end tests exercising hosts and proxies over real loopback
//! connections.

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;
use tokio::sync::mpsc;
use vigil_comm::{
    ClientHostEvent, ClientHostHandler, CommunicationHost, CommunicationHostOperation,
    CommunicationProxy, ConnectionObserver, EndpointFactory, Interlocutor, PasswordReply,
    RuntimeHostHandler, ServiceHostHandler, PEER_HOST_CAPACITY, RUNTIME_HOST_CAPACITY,
};
use vigil_core::events::{EventEmitter, PasswordPurpose};
use vigil_core::operations::{Operation, OperationResult};
use vigil_core::{
    Coordinator, OperationSequence, SessionConfiguration, SessionContext, SessionSettings,
    SessionInitializationOperation, VigilError,
};

struct RuntimeFixture {
    host: Arc<CommunicationHost>,
    handler: Arc<RuntimeHostHandler>,
    session: Arc<SessionContext>,
    password_replies: mpsc::UnboundedReceiver<PasswordReply>,
    startup_token: Uuid,
    addr: std::net::SocketAddr,
}

async fn start_runtime_host() -> RuntimeFixture {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let startup_token = Uuid::new_v4();
    let (handler, password_replies) =
        RuntimeHostHandler::new(session.clone(), coordinator, startup_token);
    let handler = Arc::new(handler);
    let host = EndpointFactory::new().create_host(handler.clone(), RUNTIME_HOST_CAPACITY);
    let addr = host.start(0).await.unwrap();
    RuntimeFixture {
        host,
        handler,
        session,
        password_replies,
        startup_token,
        addr,
    }
}

#[tokio::test]
async fn test_runtime_client_handshake_and_teardown() {
    let fixture = start_runtime_host().await;

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    proxy
        .connect(Some(fixture.startup_token), false)
        .await
        .unwrap();
    assert!(proxy.is_connected());

    let process_id = proxy.authenticate().await.unwrap();
    assert_eq!(process_id, std::process::id());

    proxy.inform_client_ready().await.unwrap();
    assert!(fixture.handler.is_client_ready());

    let terminated = proxy.disconnect().await.unwrap();
    assert!(terminated);
    assert!(!proxy.is_connected());
    assert!(!fixture.handler.is_client_ready());

    fixture.host.stop().await.unwrap();
}

#[tokio::test]
async fn test_connection_without_startup_token_is_denied() {
    let fixture = start_runtime_host().await;

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    let result = proxy.connect(Some(Uuid::new_v4()), false).await;
    assert!(matches!(result, Err(VigilError::ConnectionDenied)));
    assert!(!proxy.is_connected());

    // Without a token every further call fails fast
    assert!(matches!(
        proxy.inform_client_ready().await,
        Err(VigilError::NotConnected)
    ));

    fixture.host.stop().await.unwrap();
}

#[tokio::test]
async fn test_configuration_is_served_over_the_wire() {
    let fixture = start_runtime_host().await;
    let config = SessionConfiguration {
        settings: SessionSettings {
            start_url: Some("https://exam.example.org".into()),
            ..Default::default()
        },
        config_key: Some("ab12cd".into()),
        browser_exam_key: None,
    };
    fixture.session.set_configuration(config.clone());

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    proxy
        .connect(Some(fixture.startup_token), false)
        .await
        .unwrap();

    let served = proxy.request_configuration().await.unwrap();
    assert_eq!(served, Some(config));

    fixture.host.stop().await.unwrap();
}

#[tokio::test]
async fn test_single_slot_host_admits_one_peer_at_a_time() {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let handler = Arc::new(ServiceHostHandler::new(session, coordinator, None));
    let host = EndpointFactory::new().create_host(handler, PEER_HOST_CAPACITY);
    let addr = host.start(0).await.unwrap();

    let first = Arc::new(CommunicationProxy::new(addr, Interlocutor::Runtime));
    first.connect(None, false).await.unwrap();

    let second = Arc::new(CommunicationProxy::new(addr, Interlocutor::Runtime));
    let denied = second.connect(None, false).await;
    assert!(matches!(denied, Err(VigilError::ConnectionDenied)));

    // The slot opens up again after an orderly disconnect
    first.disconnect().await.unwrap();
    second.connect(None, false).await.unwrap();
    assert!(second.is_connected());

    host.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_concurrent_connects_admit_exactly_one_peer() {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let handler = Arc::new(ServiceHostHandler::new(session, coordinator, None));
    let host = EndpointFactory::new().create_host(handler, PEER_HOST_CAPACITY);
    let addr = host.start(0).await.unwrap();

    let tasks: Vec<_> = (0..8)
        .map(|_| {
            tokio::spawn(async move {
                let proxy = Arc::new(CommunicationProxy::new(addr, Interlocutor::Runtime));
                proxy.connect(None, false).await.is_ok()
            })
        })
        .collect();

    let winners = futures::future::join_all(tasks)
        .await
        .into_iter()
        .filter(|outcome| *outcome.as_ref().unwrap())
        .count();
    assert_eq!(winners, 1);

    host.stop().await.unwrap();
}

#[tokio::test]
async fn test_service_session_lifecycle_over_the_wire() {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let handler = Arc::new(ServiceHostHandler::new(
        session.clone(),
        coordinator.clone(),
        None,
    ));
    let host = EndpointFactory::new().create_host(handler, PEER_HOST_CAPACITY);
    let addr = host.start(0).await.unwrap();

    let proxy = Arc::new(CommunicationProxy::new(addr, Interlocutor::Runtime));
    proxy.connect(None, false).await.unwrap();

    let session_id = Uuid::new_v4();
    let accepted = proxy
        .start_session(session_id, SessionConfiguration::default())
        .await
        .unwrap();
    assert!(accepted);
    assert!(session.is_running());
    assert!(coordinator.is_session_locked());

    // A second start is denied while the first session is active
    let denied = proxy
        .start_session(Uuid::new_v4(), SessionConfiguration::default())
        .await
        .unwrap();
    assert!(!denied);

    let stopped = proxy.stop_session(session_id).await.unwrap();
    assert!(stopped);
    assert!(!session.is_running());
    assert!(!coordinator.is_session_locked());

    host.stop().await.unwrap();
}

#[tokio::test]
async fn test_password_reply_round_trip_over_the_wire() {
    let mut fixture = start_runtime_host().await;

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    proxy
        .connect(Some(fixture.startup_token), false)
        .await
        .unwrap();

    let request_id = Uuid::new_v4();
    proxy
        .submit_password(request_id, Some("correct horse".into()))
        .await
        .unwrap();
    assert_eq!(
        fixture.password_replies.recv().await.unwrap(),
        PasswordReply {
            request_id,
            password: Some("correct horse".into()),
        }
    );

    // A cancelled prompt arrives with no password
    let cancelled_id = Uuid::new_v4();
    proxy.submit_password(cancelled_id, None).await.unwrap();
    assert_eq!(
        fixture.password_replies.recv().await.unwrap(),
        PasswordReply {
            request_id: cancelled_id,
            password: None,
        }
    );

    fixture.host.stop().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_clears_token_even_when_host_is_gone() {
    let fixture = start_runtime_host().await;

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    proxy
        .connect(Some(fixture.startup_token), false)
        .await
        .unwrap();

    // The host disappears before the orderly teardown
    fixture.host.stop().await.unwrap();

    let terminated = proxy.disconnect().await.unwrap();
    assert!(!terminated);
    assert!(!proxy.is_connected());
}

#[tokio::test]
async fn test_client_host_forwards_ui_requests() {
    let authentication_token = Uuid::new_v4();
    let (handler, mut events) = ClientHostHandler::new(authentication_token);
    let host = EndpointFactory::new().create_host(Arc::new(handler), PEER_HOST_CAPACITY);
    let addr = host.start(0).await.unwrap();

    let proxy = Arc::new(CommunicationProxy::new(addr, Interlocutor::Runtime));
    proxy
        .connect(Some(authentication_token), false)
        .await
        .unwrap();

    let request_id = Uuid::new_v4();
    proxy
        .request_password(PasswordPurpose::Settings, request_id)
        .await
        .unwrap();
    proxy
        .show_message_box("Notice", "The exam starts soon")
        .await
        .unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        ClientHostEvent::PasswordRequested {
            purpose: PasswordPurpose::Settings,
            request_id,
        }
    );
    assert_eq!(
        events.recv().await.unwrap(),
        ClientHostEvent::MessageBoxRequested {
            title: "Notice".into(),
            message: "The exam starts soon".into(),
        }
    );

    host.stop().await.unwrap();
}

/// Operation that always fails, forcing a sequence rollback.
struct DoomedOperation;

#[async_trait]
impl Operation for DoomedOperation {
    fn name(&self) -> &str {
        "doomed"
    }

    async fn perform(&mut self, _events: &EventEmitter) -> vigil_core::Result<OperationResult> {
        Ok(OperationResult::Failed)
    }

    async fn revert(&mut self, _events: &EventEmitter) -> vigil_core::Result<OperationResult> {
        Ok(OperationResult::Success)
    }
}

#[tokio::test]
async fn test_failed_startup_sequence_rolls_back_host_and_session() {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let (handler, _password_replies) =
        RuntimeHostHandler::new(session.clone(), coordinator, Uuid::new_v4());
    let handler = Arc::new(handler);
    let host = EndpointFactory::new().create_host(handler, RUNTIME_HOST_CAPACITY);

    let mut sequence = OperationSequence::new(vec![
        Box::new(SessionInitializationOperation::new(session.clone())),
        Box::new(CommunicationHostOperation::new(host.clone(), 0)),
        Box::new(DoomedOperation),
    ]);

    let result = sequence.try_perform().await;
    assert_eq!(result, OperationResult::Failed);

    // Rollback stopped the host and cleared the session context
    assert!(!host.is_running());
    assert!(session.session_id().is_none());
    assert!(!session.is_running());
}

#[tokio::test]
async fn test_successful_startup_sequence_leaves_host_reachable() {
    let session = Arc::new(SessionContext::new());
    let coordinator = Arc::new(Coordinator::new());
    let startup_token = Uuid::new_v4();
    let (handler, _password_replies) =
        RuntimeHostHandler::new(session.clone(), coordinator, startup_token);
    let host = EndpointFactory::new().create_host(Arc::new(handler), RUNTIME_HOST_CAPACITY);

    let mut sequence = OperationSequence::new(vec![
        Box::new(SessionInitializationOperation::new(session.clone())),
        Box::new(CommunicationHostOperation::new(host.clone(), 0)),
    ]);

    assert_eq!(sequence.try_perform().await, OperationResult::Success);
    assert!(host.is_running());

    let proxy = Arc::new(CommunicationProxy::new(
        host.addr().unwrap(),
        Interlocutor::Client,
    ));
    proxy.connect(Some(startup_token), false).await.unwrap();
    proxy.ping().await.unwrap();
    proxy.disconnect().await.unwrap();

    assert_eq!(sequence.try_revert().await, OperationResult::Success);
    assert!(!host.is_running());
    assert!(session.session_id().is_none());
}

struct LossRecorder {
    lost: AtomicBool,
}

impl ConnectionObserver for LossRecorder {
    fn connection_lost(&self) {
        self.lost.store(true, Ordering::SeqCst);
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_auto_ping_detects_a_stopped_host() {
    let fixture = start_runtime_host().await;

    let proxy = Arc::new(CommunicationProxy::new(fixture.addr, Interlocutor::Client));
    let recorder = Arc::new(LossRecorder {
        lost: AtomicBool::new(false),
    });
    proxy.subscribe(recorder.clone());
    proxy
        .connect(Some(fixture.startup_token), true)
        .await
        .unwrap();

    fixture.host.stop().await.unwrap();

    // The liveness loop notices the dead peer within a few ping intervals
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while !recorder.lost.load(Ordering::SeqCst) {
        assert!(
            tokio::time::Instant::now() < deadline,
            "connection loss was never reported"
        );
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    assert!(!proxy.is_connected());
}
