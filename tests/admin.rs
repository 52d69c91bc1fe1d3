use color_eyre::Result;
use pretty_assertions::assert_eq;
use serial_tether::{admin, mock::Call};

mod common;
use common::session_with_backend;

#[tokio::test]
async fn port_enumeration_is_sorted() -> Result<()> {
    let (_session, backend) = session_with_backend("COM1");
    backend.set_port_names(&["COM3", "COM1", "COM2"]);

    let ports = admin::available_ports(backend.as_ref()).await?;

    assert_eq!(ports, vec!["COM1", "COM2", "COM3"]);
    assert!(backend.calls().contains(&Call::AvailablePorts));
    Ok(())
}

#[tokio::test]
async fn close_all_drops_every_port() -> Result<()> {
    let (mut first, backend) = session_with_backend("COM1");
    let mut second = serial_tether::session::SerialSession::new(
        common::fast_config("COM2"),
        backend.clone(),
        backend.clone(),
    );

    first.open().await?;
    second.open().await?;
    assert_eq!(backend.open_ports(), vec!["COM1", "COM2"]);

    admin::close_all(backend.as_ref()).await?;

    assert!(backend.open_ports().is_empty());
    assert!(backend.calls().contains(&Call::CloseAll));
    Ok(())
}

#[tokio::test]
async fn backend_side_read_cancellation_goes_through() -> Result<()> {
    let (_session, backend) = session_with_backend("COM1");

    admin::cancel_read(backend.as_ref(), "COM1").await?;

    assert!(backend
        .calls()
        .contains(&Call::CancelRead { path: "COM1".into() }));
    Ok(())
}
