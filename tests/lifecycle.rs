use std::sync::{Arc, Mutex};

use color_eyre::Result;
use pretty_assertions::assert_eq;
use serial_tether::{
    channel::ChannelError, error::Error, events::read_topic, mock::Call, session::SessionState,
};

mod common;
use common::{session_with_backend, session_with_config, settle};

#[tokio::test]
async fn open_requires_a_path() -> Result<()> {
    let (mut session, backend) = session_with_backend("");

    let err = session.open().await.unwrap_err();

    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert!(backend.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn open_requires_a_baud_rate() -> Result<()> {
    let mut config = common::fast_config("COM1");
    config.baud_rate = 0;
    let (mut session, backend) = session_with_config(config);

    let err = session.open().await.unwrap_err();

    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert!(backend.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn open_twice_is_rejected() -> Result<()> {
    let (mut session, _backend) = session_with_backend("COM2");

    session.open().await?;
    let err = session.open().await.unwrap_err();

    assert!(matches!(err, Error::AlreadyOpen(_)));
    assert_eq!(session.state(), SessionState::Open);
    Ok(())
}

#[tokio::test]
async fn close_on_a_closed_session_is_a_quiet_noop() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM3");

    session.close().await?;
    session.close().await?;

    assert!(backend.calls().is_empty());
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}

#[tokio::test]
async fn write_requires_an_open_port() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM4");

    let err = session.write("AT").await.unwrap_err();

    assert!(matches!(err, Error::NotOpen(_)));
    assert!(backend.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn open_write_close_against_the_backend() -> Result<()> {
    common::logging().await;
    let (mut session, backend) = session_with_backend("COM3");

    session.open().await?;
    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(
        backend.calls()[0],
        Call::Open {
            path: "COM3".into(),
            baud_rate: 115_200,
        }
    );

    let written = session.write("AT\r\n").await?;
    assert_eq!(written, 4);
    assert!(backend.calls().contains(&Call::Write {
        path: "COM3".into(),
        value: "AT\r\n".into(),
    }));

    // A listener registered before close must be gone afterwards.
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    session
        .listen(move |text| sink.lock().unwrap().push(text))
        .await?;

    session.close().await?;
    assert_eq!(session.state(), SessionState::Closed);
    assert!(backend.calls().contains(&Call::Close { path: "COM3".into() }));
    assert!(!session.is_listening());

    backend.emit(&read_topic("COM3"), b"too late".to_vec());
    settle().await;
    assert!(seen.lock().unwrap().is_empty());

    Ok(())
}

#[tokio::test]
async fn binary_writes_report_their_byte_count() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM5");
    session.open().await?;

    let written = session.write_bytes(&[0x01, 0x02, 0xff]).await?;

    assert_eq!(written, 3);
    assert!(backend.calls().contains(&Call::WriteBytes {
        path: "COM5".into(),
        bytes: vec![0x01, 0x02, 0xff],
    }));
    Ok(())
}

#[tokio::test]
async fn failing_backend_close_still_closes_locally() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM6");
    session.open().await?;

    backend.fail_next_close(ChannelError::Driver("stuck".into()));
    let err = session.close().await.unwrap_err();

    assert!(matches!(err, Error::Backend(_)));
    assert_eq!(session.state(), SessionState::Closed);

    // And teardown stays idempotent after the failure.
    session.close().await?;
    Ok(())
}

#[tokio::test]
async fn force_closed_port_is_noticed_on_the_next_operation() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM9");
    session.open().await?;

    serial_tether::admin::force_close(backend.as_ref(), "COM9").await?;

    // The local view is stale until an operation fails.
    assert_eq!(session.state(), SessionState::Open);

    let err = session.write("ping").await.unwrap_err();
    assert!(matches!(
        err,
        Error::Backend(ChannelError::PortNotFound(_))
    ));
    assert_eq!(session.state(), SessionState::Closed);

    // Reopening works without any manual repair.
    session.open().await?;
    assert_eq!(session.state(), SessionState::Open);
    Ok(())
}
