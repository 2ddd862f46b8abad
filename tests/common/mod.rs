//! A fake transport shared across the integration tests (§6): records what
//! the client asked it to do and lets a test script which events to hand
//! back on the next `poll_events` call.

use std::cell::RefCell;
use std::rc::Rc;

use hubclient::transport::{
    CloudToDeviceMessage, ConnectionStatus, ConnectionStatusReason, Disposition, GetTwinToken,
    OutboundMessageRef, ProcessItemResult, Transport, TransportEvent, TransportResult,
    TwinItemRef, TwinUpdateState,
};
use hubclient::{MethodHandle, RetryPolicy, RetrySettings};

#[derive(Default)]
pub struct Recorded {
    pub registered: bool,
    pub unregistered: bool,
    pub c2d_subscribed: bool,
    pub twin_subscribed: bool,
    pub method_subscribed: bool,
    pub input_subscriptions: Vec<String>,
    pub dispositions: Vec<Disposition>,
    pub method_responses: Vec<(MethodHandle, i32)>,
    pub sent_batches: Vec<Vec<u64>>,
    pub options: Vec<(String, String)>,
}

#[derive(Default)]
pub struct FakeTransportState {
    pub recorded: Recorded,
    pub queued_events: Vec<TransportEvent>,
    pub process_twin_result: Option<ProcessItemResult>,
    pub fail_register: bool,
}

#[derive(Clone)]
pub struct FakeTransport(Rc<RefCell<FakeTransportState>>);

impl FakeTransport {
    pub fn new() -> Self {
        FakeTransport(Rc::new(RefCell::new(FakeTransportState::default())))
    }

    pub fn state(&self) -> Rc<RefCell<FakeTransportState>> {
        self.0.clone()
    }

    pub fn push_event(&self, event: TransportEvent) {
        self.0.borrow_mut().queued_events.push(event);
    }
}

impl Transport for FakeTransport {
    fn register_device(&mut self) -> TransportResult<()> {
        let mut state = self.0.borrow_mut();
        if state.fail_register {
            return Err(hubclient::transport::TransportError(anyhow::anyhow!(
                "registration refused"
            )));
        }
        state.recorded.registered = true;
        Ok(())
    }

    fn unregister_device(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.unregistered = true;
        Ok(())
    }

    fn subscribe_c2d(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.c2d_subscribed = true;
        Ok(())
    }

    fn unsubscribe_c2d(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.c2d_subscribed = false;
        Ok(())
    }

    fn subscribe_twin(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.twin_subscribed = true;
        Ok(())
    }

    fn unsubscribe_twin(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.twin_subscribed = false;
        Ok(())
    }

    fn subscribe_method(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.method_subscribed = true;
        Ok(())
    }

    fn unsubscribe_method(&mut self) -> TransportResult<()> {
        self.0.borrow_mut().recorded.method_subscribed = false;
        Ok(())
    }

    fn subscribe_input_queue(&mut self, input_name: &str) -> TransportResult<()> {
        self.0
            .borrow_mut()
            .recorded
            .input_subscriptions
            .push(input_name.to_owned());
        Ok(())
    }

    fn unsubscribe_input_queue(&mut self, input_name: &str) -> TransportResult<()> {
        self.0
            .borrow_mut()
            .recorded
            .input_subscriptions
            .retain(|n| n != input_name);
        Ok(())
    }

    fn get_twin_async(&mut self, _token: GetTwinToken) -> TransportResult<()> {
        Ok(())
    }

    fn process_twin_item(&mut self, _item: TwinItemRef<'_>) -> ProcessItemResult {
        self.0
            .borrow()
            .process_twin_result
            .unwrap_or(ProcessItemResult::Ok)
    }

    fn send_message_disposition(
        &mut self,
        _message: &CloudToDeviceMessage,
        disposition: Disposition,
    ) -> TransportResult<()> {
        self.0.borrow_mut().recorded.dispositions.push(disposition);
        Ok(())
    }

    fn device_method_response(
        &mut self,
        handle: MethodHandle,
        _response: &[u8],
        status: i32,
    ) -> TransportResult<()> {
        self.0
            .borrow_mut()
            .recorded
            .method_responses
            .push((handle, status));
        Ok(())
    }

    fn set_option(&mut self, name: &str, value: &str) -> TransportResult<()> {
        self.0
            .borrow_mut()
            .recorded
            .options
            .push((name.to_owned(), value.to_owned()));
        Ok(())
    }

    fn set_retry_policy(&mut self, _settings: RetrySettings) -> TransportResult<()> {
        Ok(())
    }

    fn hostname(&self) -> &str {
        "fake.example.net"
    }

    fn send_batch(&mut self, outbound: &[OutboundMessageRef<'_>]) -> TransportResult<()> {
        self.0
            .borrow_mut()
            .recorded
            .sent_batches
            .push(outbound.iter().map(|m| m.id).collect());
        Ok(())
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        std::mem::take(&mut self.0.borrow_mut().queued_events)
    }

    fn do_work(&mut self) {}
}

#[allow(dead_code)]
pub fn ok_connection_event() -> TransportEvent {
    TransportEvent::ConnectionStatusChanged {
        status: ConnectionStatus::Connected,
        reason: ConnectionStatusReason::ConnectionOk,
    }
}

#[allow(dead_code)]
pub fn twin_partial(payload: &[u8]) -> TransportEvent {
    TransportEvent::DesiredPropertyUpdate {
        state: TwinUpdateState::Partial,
        payload: payload.to_vec(),
    }
}

#[allow(dead_code)]
pub fn twin_complete(payload: &[u8]) -> TransportEvent {
    TransportEvent::DesiredPropertyUpdate {
        state: TwinUpdateState::Complete,
        payload: payload.to_vec(),
    }
}

#[allow(dead_code)]
pub fn identity_connection_string() -> &'static str {
    "HostName=h.example.net;DeviceId=d;SharedAccessKey=k"
}

#[allow(dead_code)]
pub fn retry_none() -> RetrySettings {
    RetrySettings {
        policy: RetryPolicy::None,
        timeout: None,
    }
}

/// A provisioning stub that assigns a hub the moment `register_device` is
/// called, for exercising the provisioning-backed attach path without a real
/// provisioning service.
#[allow(dead_code)]
pub struct ImmediatelyAssignedProvisioning {
    outcome: Option<hubclient::RegistrationOutcome>,
}

#[allow(dead_code)]
impl ImmediatelyAssignedProvisioning {
    pub fn new() -> Self {
        ImmediatelyAssignedProvisioning { outcome: None }
    }
}

impl hubclient::Provisioning for ImmediatelyAssignedProvisioning {
    fn register_device(&mut self) -> hubclient::Result<()> {
        self.outcome = Some(hubclient::RegistrationOutcome::Assigned(
            hubclient::ProvisioningResult {
                assigned_hub: "h.example.net".to_owned(),
                device_id: "d".to_owned(),
            },
        ));
        Ok(())
    }

    fn set_option(&mut self, _name: &str, _value: &str) -> hubclient::Result<()> {
        Ok(())
    }

    fn set_provisioning_payload(&mut self, _payload: &[u8]) -> hubclient::Result<()> {
        Ok(())
    }

    fn do_work(&mut self) {}

    fn poll_status(&mut self) -> Vec<hubclient::RegistrationStatus> {
        Vec::new()
    }

    fn poll_outcome(&mut self) -> Option<hubclient::RegistrationOutcome> {
        self.outcome.take()
    }
}
