use color_eyre::Result;
use pretty_assertions::assert_eq;
use serial_tether::{
    channel::ChannelError, config::ConfigDelta, error::Error, mock::Call, session::SessionState,
};

mod common;
use common::{session_with_backend, session_with_config};

#[tokio::test]
async fn changing_baud_cycles_an_open_session() -> Result<()> {
    common::logging().await;
    let (mut session, backend) = session_with_backend("COM5");
    session.open().await?;

    session.change(ConfigDelta::baud_rate(9600)).await?;

    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(session.config().baud_rate, 9600);
    assert_eq!(
        backend.calls(),
        vec![
            Call::Open {
                path: "COM5".into(),
                baud_rate: 115_200,
            },
            Call::Close { path: "COM5".into() },
            Call::Open {
                path: "COM5".into(),
                baud_rate: 9600,
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn reconfiguring_a_closed_session_touches_no_backend() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM1");

    session.set_path("COM2").await?;
    session.set_baud_rate(57_600).await?;

    assert!(backend.calls().is_empty());
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.config().path, "COM2");
    assert_eq!(session.config().baud_rate, 57_600);
    Ok(())
}

#[tokio::test]
async fn moving_ports_closes_the_old_and_opens_the_new() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM1");
    session.open().await?;

    session.set_path("COM2").await?;

    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(
        backend.calls(),
        vec![
            Call::Open {
                path: "COM1".into(),
                baud_rate: 115_200,
            },
            Call::Close { path: "COM1".into() },
            Call::Open {
                path: "COM2".into(),
                baud_rate: 115_200,
            },
        ]
    );
    Ok(())
}

#[tokio::test]
async fn both_fields_change_in_one_cycle() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM1");
    session.open().await?;

    let delta = ConfigDelta {
        path: Some("COM8".into()),
        baud_rate: Some(9600),
    };
    session.change(delta).await?;

    assert_eq!(session.config().path, "COM8");
    assert_eq!(session.config().baud_rate, 9600);
    assert!(backend.calls().contains(&Call::Open {
        path: "COM8".into(),
        baud_rate: 9600,
    }));
    Ok(())
}

#[tokio::test]
async fn a_failed_reopen_leaves_the_session_closed_but_reconfigured() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM3");
    session.open().await?;

    backend.fail_next_open(ChannelError::Driver("port vanished".into()));
    let err = session.change(ConfigDelta::baud_rate(300)).await.unwrap_err();

    assert!(matches!(err, Error::Backend(_)));

    // No rollback: the new value is applied, the caller inspects
    // state and retries.
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(session.config().baud_rate, 300);

    session.open().await?;
    assert_eq!(session.state(), SessionState::Open);
    Ok(())
}

#[tokio::test]
async fn an_empty_delta_still_cycles() -> Result<()> {
    let (mut session, backend) = session_with_backend("COM4");
    session.open().await?;

    session.change(ConfigDelta::default()).await?;

    assert_eq!(session.state(), SessionState::Open);
    assert_eq!(backend.calls().len(), 3);
    Ok(())
}

#[tokio::test]
async fn reconfiguring_to_an_empty_path_fails_the_reopen() -> Result<()> {
    let (mut session, _backend) = session_with_config(common::fast_config("COM6"));
    session.open().await?;

    let err = session.set_path("").await.unwrap_err();

    assert!(matches!(err, Error::InvalidConfiguration(_)));
    assert_eq!(session.state(), SessionState::Closed);
    Ok(())
}
