//! A client built directly from a connection string is ATTACHED immediately
//! (§4.2): no registration round trip, no transport I/O before the first
//! `do_work`.

use hubclient::{ClientBuilder, RegistrationState};

#[path = "common/mod.rs"]
mod common;

#[test]
fn connection_string_client_is_attached_without_any_transport_calls() {
    let transport = common::FakeTransport::new();
    let state = transport.state();

    let client = ClientBuilder::from_connection_string(common::identity_connection_string())
        .unwrap()
        .with_transport(Box::new(transport))
        .build()
        .unwrap();

    assert_eq!(client.registration_state(), RegistrationState::Attached);
    assert!(!state.borrow().recorded.registered);
}

#[test]
fn missing_transport_is_rejected_before_any_state_is_built() {
    let result = ClientBuilder::from_connection_string(common::identity_connection_string())
        .unwrap()
        .build();
    assert!(result.is_err());
}

#[test]
fn instance_override_changes_the_hub_without_touching_device_id() {
    let transport = common::FakeTransport::new();
    let client = ClientBuilder::from_connection_string(common::identity_connection_string())
        .unwrap()
        .with_instance("otherhub")
        .with_transport(Box::new(transport))
        .build()
        .unwrap();
    assert_eq!(client.registration_state(), RegistrationState::Attached);
}
