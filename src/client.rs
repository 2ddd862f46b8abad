//! The client state machine (§3, §4): owns every queue, registry, and
//! callback slot, and coordinates provisioning → hub-attachment → normal
//! operation. Single-owner, cooperatively driven — see the crate-level docs
//! for why this is not `Send`/`Sync`.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::time::SystemTime;

use crate::auth::Authorization;
use crate::blob_upload::{BlobUploadFactory, BlobUploadModule};
use crate::diagnostics::{DiagnosticSampler, PercentageSampler};
use crate::dispatch::message::dispatch_message;
use crate::dispatch::method::{dispatch_sync, MethodDispatchOutcome};
use crate::dispatch::{InputRouteRegistry, MessageCallback, MethodCallback, MethodHandle};
use crate::error::{ClientError, Result};
use crate::identity::Identity;
use crate::method_invoke::MethodInvoker;
use crate::options::{self, OptionContext};
use crate::product_info::{self, PlatformInfo};
use crate::provisioning::{Provisioning, RegistrationOutcome};
use crate::queue::outbound::OutboundCallback;
use crate::queue::twin::TwinCallback;
use crate::queue::{ItemIdAllocator, OutboundQueue, TwinQueues};
use crate::retry::RetrySettings;
use crate::tick::TickSource;
use crate::transport::{
    CloudToDeviceMessage, ConnectionStatus, ConnectionStatusReason, Disposition, GetTwinToken,
    ProcessItemResult, Transport, TransportEvent, TransportResult, TwinItemRef, TwinUpdateState,
};

/// One of the six registration states from §4.2. `ERROR` is terminal until
/// the client is destroyed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    Idle,
    PreRegister,
    Registering,
    Registered,
    Attached,
    Error,
}

/// Bit flags recorded while a subscription-related call arrives before the
/// client has attached. Drained exactly once on the REGISTERED → ATTACHED
/// transition.
///
/// §9 Open Question (a): the call this is modeled on clears a pending
/// subscribe intent with `|= !FLAG` instead of `&= !FLAG`, which sets every
/// *other* bit instead of clearing the one intended. `clear` here only ever
/// performs `&= !flag`, so that bug has no equivalent to reproduce.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingIntents(u8);

impl PendingIntents {
    pub const NONE: PendingIntents = PendingIntents(0);
    pub const C2D_SUBSCRIBE: PendingIntents = PendingIntents(1 << 0);
    pub const TWIN_SUBSCRIBE: PendingIntents = PendingIntents(1 << 1);
    pub const METHOD_SUBSCRIBE: PendingIntents = PendingIntents(1 << 2);
    pub const DISPOSITION_SEND: PendingIntents = PendingIntents(1 << 3);

    pub fn set(&mut self, flag: PendingIntents) {
        self.0 |= flag.0;
    }

    pub fn clear(&mut self, flag: PendingIntents) {
        self.0 &= !flag.0;
    }

    pub fn contains(self, flag: PendingIntents) -> bool {
        self.0 & flag.0 == flag.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

/// Ownership split for the transport handle (§9 "Shared ownership of the
/// transport"): a client created directly owns its transport outright; a
/// client created through the shared-transport path holds a non-owning
/// handle instead, so dropping it never drops the underlying transport
/// while other clients still reference it.
pub enum TransportHandle {
    Owned(Box<dyn Transport>),
    Shared(Rc<RefCell<dyn Transport>>),
}

impl TransportHandle {
    pub fn is_shared(&self) -> bool {
        matches!(self, TransportHandle::Shared(_))
    }

    fn hostname(&self) -> String {
        match self {
            TransportHandle::Owned(t) => t.hostname().to_owned(),
            TransportHandle::Shared(t) => t.borrow().hostname().to_owned(),
        }
    }
}

/// Run `f` against whichever shape `slot` holds. A free function (not a
/// method) so callers can still borrow other `Client` fields for the
/// duration of the call.
fn with_transport<R>(
    slot: &mut Option<TransportHandle>,
    f: impl FnOnce(&mut dyn Transport) -> R,
) -> Option<R> {
    match slot.as_mut()? {
        TransportHandle::Owned(t) => Some(f(t.as_mut())),
        TransportHandle::Shared(t) => Some(f(&mut *t.borrow_mut())),
    }
}

/// Factory for the transport built once provisioning hands off a hub URI
/// and device id. Clients constructed directly from an identity already
/// have a transport and never use this.
pub type TransportFactory = Box<dyn Fn(&Identity) -> Result<Box<dyn Transport>>>;

pub struct Client {
    identity: Option<Identity>,
    authorization: Box<dyn Authorization>,
    transport: Option<TransportHandle>,
    transport_factory: Option<TransportFactory>,
    provisioning: Option<Box<dyn Provisioning>>,

    outbound: OutboundQueue,
    twin: TwinQueues,
    twin_ids: ItemIdAllocator,
    complete_twin_update_encountered: bool,
    desired_property_callback: Option<Box<dyn FnMut(Vec<u8>)>>,
    get_twin_next_token: u64,
    get_twin_one_shots: HashMap<GetTwinToken, Box<dyn FnOnce(Vec<u8>)>>,

    message_callback: MessageCallback,
    method_callback: MethodCallback,
    input_routes: InputRouteRegistry,
    connection_status_callback: Option<Box<dyn FnMut(ConnectionStatus, ConnectionStatusReason)>>,
    pending_intents: PendingIntents,
    pending_dispositions: Vec<(CloudToDeviceMessage, Disposition)>,

    registration_state: RegistrationState,
    retry: RetrySettings,
    last_message_receive_time: Option<SystemTime>,
    message_timeout_ms: Option<u64>,
    user_product_info: Option<String>,
    product_info: String,
    platform: Box<dyn PlatformInfo>,
    diagnostic_sampler: PercentageSampler,
    log_trace: bool,

    blob_upload: Option<Box<dyn BlobUploadModule>>,
    blob_upload_factory: Box<dyn BlobUploadFactory>,
    method_invoke: Option<Box<dyn MethodInvoker>>,

    tick_source: TickSource,
}

impl Client {
    pub(crate) fn new_attached(
        identity: Identity,
        authorization: Box<dyn Authorization>,
        transport: TransportHandle,
        platform: Box<dyn PlatformInfo>,
        blob_upload_factory: Box<dyn BlobUploadFactory>,
    ) -> Client {
        let product_info = product_info::compose(None, platform.as_ref());
        Client {
            identity: Some(identity),
            authorization,
            transport: Some(transport),
            transport_factory: None,
            provisioning: None,
            outbound: OutboundQueue::new(),
            twin: TwinQueues::new(),
            twin_ids: ItemIdAllocator::new(),
            complete_twin_update_encountered: false,
            desired_property_callback: None,
            get_twin_next_token: 0,
            get_twin_one_shots: HashMap::new(),
            message_callback: MessageCallback::None,
            method_callback: MethodCallback::None,
            input_routes: InputRouteRegistry::new(),
            connection_status_callback: None,
            pending_intents: PendingIntents::NONE,
            pending_dispositions: Vec::new(),
            registration_state: RegistrationState::Attached,
            retry: RetrySettings::default(),
            last_message_receive_time: None,
            message_timeout_ms: None,
            user_product_info: None,
            product_info,
            platform,
            diagnostic_sampler: PercentageSampler::new(),
            log_trace: false,
            blob_upload: None,
            blob_upload_factory,
            method_invoke: None,
            tick_source: TickSource::new(),
        }
    }

    pub(crate) fn new_provisioning(
        authorization: Box<dyn Authorization>,
        provisioning: Box<dyn Provisioning>,
        transport_factory: TransportFactory,
        platform: Box<dyn PlatformInfo>,
        blob_upload_factory: Box<dyn BlobUploadFactory>,
    ) -> Client {
        let product_info = product_info::compose(None, platform.as_ref());
        Client {
            identity: None,
            authorization,
            transport: None,
            transport_factory: Some(transport_factory),
            provisioning: Some(provisioning),
            outbound: OutboundQueue::new(),
            twin: TwinQueues::new(),
            twin_ids: ItemIdAllocator::new(),
            complete_twin_update_encountered: false,
            desired_property_callback: None,
            get_twin_next_token: 0,
            get_twin_one_shots: HashMap::new(),
            message_callback: MessageCallback::None,
            method_callback: MethodCallback::None,
            input_routes: InputRouteRegistry::new(),
            connection_status_callback: None,
            pending_intents: PendingIntents::NONE,
            pending_dispositions: Vec::new(),
            registration_state: RegistrationState::Idle,
            retry: RetrySettings::default(),
            last_message_receive_time: None,
            message_timeout_ms: None,
            user_product_info: None,
            product_info,
            platform,
            diagnostic_sampler: PercentageSampler::new(),
            log_trace: false,
            blob_upload: None,
            blob_upload_factory,
            method_invoke: None,
            tick_source: TickSource::new(),
        }
    }

    pub fn registration_state(&self) -> RegistrationState {
        self.registration_state
    }

    pub fn is_shared_transport(&self) -> bool {
        self.transport.as_ref().is_some_and(TransportHandle::is_shared)
    }

    fn require_transport_context(&self) -> Result<()> {
        match self.registration_state {
            RegistrationState::Attached => Ok(()),
            _ => Err(ClientError::NotYetProvisioned),
        }
    }

    // ---- 4.3 outbound telemetry -----------------------------------------

    pub fn send_event_async(
        &mut self,
        payload: Vec<u8>,
        callback: Option<OutboundCallback>,
    ) -> Result<()> {
        self.send_event_inner(payload, None, callback)
    }

    pub fn send_event_to_output_async(
        &mut self,
        payload: Vec<u8>,
        output_name: impl Into<String>,
        callback: Option<OutboundCallback>,
    ) -> Result<()> {
        self.send_event_inner(payload, Some(output_name.into()), callback)
    }

    fn send_event_inner(
        &mut self,
        payload: Vec<u8>,
        output_name: Option<String>,
        callback: Option<OutboundCallback>,
    ) -> Result<()> {
        if self.diagnostic_sampler.sample() {
            log::trace!("message tagged for diagnostic sampling");
        }
        let now = self.tick_source.now();
        self.outbound
            .enqueue(payload, output_name, callback, now, self.message_timeout_ms);
        Ok(())
    }

    // ---- 4.4 twin reported-state round trip ------------------------------

    pub fn send_reported_state(
        &mut self,
        payload: Vec<u8>,
        callback: Option<TwinCallback>,
    ) -> Result<u32> {
        let item_id = self.twin_ids.next();
        self.twin.enqueue_pending(item_id, payload.into(), callback);
        self.ensure_subscribed(PendingIntents::TWIN_SUBSCRIBE, |t| t.subscribe_twin())?;
        Ok(item_id)
    }

    pub fn get_twin_async(&mut self, callback: Box<dyn FnOnce(Vec<u8>)>) -> Result<()> {
        self.ensure_subscribed(PendingIntents::TWIN_SUBSCRIBE, |t| t.subscribe_twin())?;
        self.get_twin_next_token = self.get_twin_next_token.wrapping_add(1);
        let token = GetTwinToken(self.get_twin_next_token);
        self.get_twin_one_shots.insert(token, callback);
        self.complete_twin_update_encountered = true;
        match with_transport(&mut self.transport, |t| t.get_twin_async(token)) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ClientError::Error(err.0)),
            None => Err(ClientError::NotYetProvisioned),
        }
    }

    /// Register the callback fired on desired-property updates (full
    /// document or incremental patch, per §4.5's sticky-flag gating).
    pub fn set_desired_property_callback(&mut self, callback: Box<dyn FnMut(Vec<u8>)>) -> Result<()> {
        self.desired_property_callback = Some(callback);
        self.ensure_subscribed(PendingIntents::TWIN_SUBSCRIBE, |t| t.subscribe_twin())
    }

    fn deliver_twin_update(&mut self, state: TwinUpdateState, payload: Vec<u8>) {
        if state == TwinUpdateState::Complete {
            self.complete_twin_update_encountered = true;
        }
        if !self.complete_twin_update_encountered {
            log::debug!("dropping partial twin update observed before any complete update");
            return;
        }
        if let Some(callback) = self.desired_property_callback.as_mut() {
            callback(payload);
        }
    }

    // ---- 4.6 method dispatch ----------------------------------------------

    pub fn set_device_method_callback(
        &mut self,
        callback: impl FnMut(&str, &[u8]) -> (i32, Vec<u8>) + 'static,
    ) -> Result<()> {
        if matches!(self.method_callback, MethodCallback::AsyncExtended(_)) {
            return Err(ClientError::invalid_argument(
                "an async-extended method callback is already registered",
            ));
        }
        let previous = std::mem::replace(
            &mut self.method_callback,
            MethodCallback::Sync(Box::new(callback)),
        );
        if let Err(err) = self.ensure_subscribed(PendingIntents::METHOD_SUBSCRIBE, |t| t.subscribe_method()) {
            self.method_callback = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_device_method_callback_ex(
        &mut self,
        callback: impl FnMut(&str, &[u8], MethodHandle) -> i32 + 'static,
    ) -> Result<()> {
        if matches!(self.method_callback, MethodCallback::Sync(_)) {
            return Err(ClientError::invalid_argument(
                "a synchronous method callback is already registered",
            ));
        }
        let previous = std::mem::replace(
            &mut self.method_callback,
            MethodCallback::AsyncExtended(Box::new(callback)),
        );
        if let Err(err) = self.ensure_subscribed(PendingIntents::METHOD_SUBSCRIBE, |t| t.subscribe_method()) {
            self.method_callback = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn device_method_response(
        &mut self,
        handle: MethodHandle,
        response: &[u8],
        status: i32,
    ) -> Result<()> {
        match with_transport(&mut self.transport, |t| {
            t.device_method_response(handle, response, status)
        }) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ClientError::Error(err.0)),
            None => Err(ClientError::NotYetProvisioned),
        }
    }

    // ---- 4.7 message dispatch ----------------------------------------------

    pub fn set_message_callback(
        &mut self,
        callback: impl FnMut(&CloudToDeviceMessage) -> Disposition + 'static,
    ) -> Result<()> {
        if matches!(self.message_callback, MessageCallback::AsyncExtended(_)) {
            return Err(ClientError::invalid_argument(
                "an async-extended message callback is already registered",
            ));
        }
        let previous = std::mem::replace(
            &mut self.message_callback,
            MessageCallback::Sync(Box::new(callback)),
        );
        if let Err(err) = self.ensure_subscribed(PendingIntents::C2D_SUBSCRIBE, |t| t.subscribe_c2d()) {
            self.message_callback = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_message_callback_ex(
        &mut self,
        callback: impl FnMut(&CloudToDeviceMessage) -> bool + 'static,
    ) -> Result<()> {
        if matches!(self.message_callback, MessageCallback::Sync(_)) {
            return Err(ClientError::invalid_argument(
                "a synchronous message callback is already registered",
            ));
        }
        let previous = std::mem::replace(
            &mut self.message_callback,
            MessageCallback::AsyncExtended(Box::new(callback)),
        );
        if let Err(err) = self.ensure_subscribed(PendingIntents::C2D_SUBSCRIBE, |t| t.subscribe_c2d()) {
            self.message_callback = previous;
            return Err(err);
        }
        Ok(())
    }

    pub fn set_input_message_callback(
        &mut self,
        input_name: impl Into<String>,
        callback: MessageCallback,
    ) -> Result<()> {
        let input_name = input_name.into();
        let was_empty = self.input_routes.register(Some(input_name.clone()), callback);
        if was_empty {
            if let Err(err) = self.ensure_subscribed(PendingIntents::C2D_SUBSCRIBE, {
                let input_name = input_name.clone();
                move |t| t.subscribe_input_queue(&input_name)
            }) {
                self.input_routes.deregister(&Some(input_name));
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn remove_input_message_callback(&mut self, input_name: impl Into<String>) -> Result<()> {
        let input_name = Some(input_name.into());
        let now_empty = self.input_routes.deregister(&input_name);
        if now_empty {
            if let Some(name) = input_name {
                let _ = with_transport(&mut self.transport, |t| t.unsubscribe_input_queue(&name));
            }
        }
        Ok(())
    }

    /// Manually forward a disposition for a previously received message
    /// (the async-extended C2D path's counterpart to the sync path's
    /// automatic forward).
    pub fn send_message_disposition(
        &mut self,
        message: CloudToDeviceMessage,
        disposition: Disposition,
    ) -> Result<()> {
        if self.registration_state != RegistrationState::Attached {
            self.pending_intents.set(PendingIntents::DISPOSITION_SEND);
            self.pending_dispositions.push((message, disposition));
            return Ok(());
        }
        match with_transport(&mut self.transport, |t| {
            t.send_message_disposition(&message, disposition)
        }) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ClientError::Error(err.0)),
            None => Err(ClientError::NotYetProvisioned),
        }
    }

    // ---- 4.8 options --------------------------------------------------------

    pub fn set_option(&mut self, name: &str, value: &str) -> Result<()> {
        // A `Shared` transport only needs a shared borrow of the `Rc` to
        // reach its `RefCell`, so it's resolved up front and handed to
        // `OptionContext` as a plain `&mut dyn Transport` either way.
        let mut shared_guard = match self.transport.as_ref() {
            Some(TransportHandle::Shared(t)) => Some(t.borrow_mut()),
            _ => None,
        };
        let transport: Option<&mut dyn Transport> = if let Some(guard) = shared_guard.as_deref_mut() {
            Some(guard)
        } else {
            match self.transport.as_mut() {
                Some(TransportHandle::Owned(t)) => Some(t.as_mut()),
                _ => None,
            }
        };

        let ctx = OptionContext {
            message_timeout_ms: &mut self.message_timeout_ms,
            user_product_info: &mut self.user_product_info,
            product_info: &mut self.product_info,
            platform: self.platform.as_ref(),
            diagnostic_sampler: &mut self.diagnostic_sampler,
            blob_upload: &mut self.blob_upload,
            blob_upload_factory: self.blob_upload_factory.as_ref(),
            authorization: self.authorization.as_mut(),
            log_trace: &mut self.log_trace,
            transport,
            provisioning: self.provisioning.as_deref_mut(),
        };
        options::set_option(ctx, name, value)
    }

    /// The composed `product_info` string (§3) currently in effect: the SDK
    /// tag and platform description, prefixed with the application's own tag
    /// if `set_option("product_info", ...)` has been called.
    pub fn product_info(&self) -> &str {
        &self.product_info
    }

    /// Attach an edge-module method-invocation handle (§1). The core never
    /// calls through it; it is only held for lifetime management and
    /// released on [`Client::destroy`].
    pub fn attach_method_invoker(&mut self, invoker: Box<dyn MethodInvoker>) {
        self.method_invoke = Some(invoker);
    }

    // ---- connection status / retry -----------------------------------------

    pub fn set_connection_status_callback(
        &mut self,
        callback: impl FnMut(ConnectionStatus, ConnectionStatusReason) + 'static,
    ) {
        self.connection_status_callback = Some(Box::new(callback));
    }

    fn emit_connection_status(&mut self, status: ConnectionStatus, reason: ConnectionStatusReason) {
        if let Some(callback) = self.connection_status_callback.as_mut() {
            callback(status, reason);
        }
    }

    pub fn set_retry_policy(&mut self, settings: RetrySettings) -> Result<()> {
        self.retry = settings;
        match with_transport(&mut self.transport, |t| t.set_retry_policy(settings)) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ClientError::Error(err.0)),
            None => Ok(()),
        }
    }

    pub fn retry_policy(&self) -> RetrySettings {
        self.retry
    }

    pub fn get_send_status(&self) -> bool {
        !self.outbound.is_empty()
    }

    pub fn last_message_receive_time(&self) -> Result<SystemTime> {
        self.last_message_receive_time
            .ok_or(ClientError::IndefiniteTime)
    }

    // ---- 4.9 driver loop ----------------------------------------------------

    pub fn do_work(&mut self) {
        match self.registration_state {
            RegistrationState::Attached => self.pump_attached(),
            RegistrationState::Error => {
                self.emit_connection_status(
                    ConnectionStatus::Disconnected,
                    ConnectionStatusReason::ProvisioningFailed,
                );
            }
            _ => self.pump_provisioning(),
        }
    }

    fn pump_provisioning(&mut self) {
        if matches!(
            self.registration_state,
            RegistrationState::Idle | RegistrationState::PreRegister
        ) {
            self.registration_state = RegistrationState::PreRegister;
            let started = self
                .provisioning
                .as_mut()
                .map(|p| p.register_device())
                .unwrap_or(Ok(()));
            if let Err(err) = started {
                log::error!("failed to start registration: {err}");
                self.registration_state = RegistrationState::Error;
                return;
            }
            self.registration_state = RegistrationState::Registering;
        }

        let Some(provisioning) = self.provisioning.as_mut() else {
            return;
        };
        provisioning.do_work();
        for status in provisioning.poll_status() {
            log::debug!("provisioning status update: {status:?}");
        }

        match provisioning.poll_outcome() {
            Some(RegistrationOutcome::Assigned(assigned)) => {
                match Identity::parse(&format!(
                    "HostName={};DeviceId={};UseProvisioning=true",
                    assigned.assigned_hub, assigned.device_id
                )) {
                    Ok(identity) => {
                        self.identity = Some(identity.clone());
                        if self.log_trace {
                            let _ = self.provisioning.as_mut().map(|p| p.set_option("logtrace", "true"));
                        }
                        match self.transport_factory.as_ref().map(|f| f(&identity)) {
                            Some(Ok(transport)) => {
                                self.transport = Some(TransportHandle::Owned(transport));
                                self.registration_state = RegistrationState::Registered;
                                self.attach();
                            }
                            Some(Err(err)) => {
                                log::error!("failed to initialize transport after provisioning: {err}");
                                self.registration_state = RegistrationState::Error;
                            }
                            None => {
                                self.registration_state = RegistrationState::Registered;
                                self.attach();
                            }
                        }
                    }
                    Err(err) => {
                        log::error!("provisioning returned an unusable hub assignment: {err}");
                        self.registration_state = RegistrationState::Error;
                    }
                }
            }
            Some(RegistrationOutcome::Failed(err)) => {
                log::error!("provisioning failed: {err}");
                self.registration_state = RegistrationState::Error;
                self.emit_connection_status(
                    ConnectionStatus::Disconnected,
                    ConnectionStatusReason::ProvisioningFailed,
                );
            }
            None => {}
        }
    }

    fn attach(&mut self) {
        if self.registration_state != RegistrationState::Registered {
            return;
        }
        if self.log_trace {
            let _ = with_transport(&mut self.transport, |t| t.set_option("logtrace", "true"));
        }
        let registered = with_transport(&mut self.transport, |t| t.register_device());
        if let Some(Err(err)) = registered {
            log::error!("device registration with transport failed: {err}");
            self.registration_state = RegistrationState::Error;
            return;
        }
        self.drain_pending_intents();
        self.provisioning = None;
        self.registration_state = RegistrationState::Attached;
        self.emit_connection_status(ConnectionStatus::Connected, ConnectionStatusReason::ConnectionOk);
    }

    fn drain_pending_intents(&mut self) {
        if self.pending_intents.contains(PendingIntents::C2D_SUBSCRIBE) {
            let _ = with_transport(&mut self.transport, |t| t.subscribe_c2d());
            self.pending_intents.clear(PendingIntents::C2D_SUBSCRIBE);
        }
        if self.pending_intents.contains(PendingIntents::TWIN_SUBSCRIBE) {
            let _ = with_transport(&mut self.transport, |t| t.subscribe_twin());
            self.pending_intents.clear(PendingIntents::TWIN_SUBSCRIBE);
        }
        if self.pending_intents.contains(PendingIntents::METHOD_SUBSCRIBE) {
            let _ = with_transport(&mut self.transport, |t| t.subscribe_method());
            self.pending_intents.clear(PendingIntents::METHOD_SUBSCRIBE);
        }
        if self.pending_intents.contains(PendingIntents::DISPOSITION_SEND) {
            for (message, disposition) in self.pending_dispositions.drain(..) {
                let _ = with_transport(&mut self.transport, |t| {
                    t.send_message_disposition(&message, disposition)
                });
            }
            self.pending_intents.clear(PendingIntents::DISPOSITION_SEND);
        }
        debug_assert!(self.pending_intents.is_empty());
    }

    fn ensure_subscribed(
        &mut self,
        intent: PendingIntents,
        subscribe: impl FnOnce(&mut dyn Transport) -> TransportResult<()>,
    ) -> Result<()> {
        if self.registration_state != RegistrationState::Attached {
            self.pending_intents.set(intent);
            return Ok(());
        }
        match with_transport(&mut self.transport, subscribe) {
            Some(Ok(())) => Ok(()),
            Some(Err(err)) => Err(ClientError::Error(err.0)),
            None => Ok(()),
        }
    }

    fn pump_attached(&mut self) {
        let now = self.tick_source.now();
        for completed in self.outbound.sweep_timeouts(now) {
            if let Some(callback) = completed.callback {
                callback(completed.result);
            }
        }

        loop {
            let Some((item_id, payload)) = self
                .twin
                .pending_payloads()
                .next()
                .map(|(id, p)| (id, p.to_vec()))
            else {
                break;
            };
            let result = with_transport(&mut self.transport, |t| {
                t.process_twin_item(TwinItemRef {
                    item_id,
                    payload: &payload,
                })
            });
            match result {
                Some(ProcessItemResult::Ok) => self.twin.accept_front(item_id),
                Some(ProcessItemResult::Error) => {
                    log::warn!("twin item {item_id} rejected by transport, dropping it");
                    self.twin.drop_front();
                }
                Some(ProcessItemResult::Continue) | Some(ProcessItemResult::NotConnected) | None => {
                    break;
                }
            }
        }

        let outbound_refs = self.outbound.snapshot_refs();
        if let Some(Err(err)) = with_transport(&mut self.transport, |t| t.send_batch(&outbound_refs)) {
            log::warn!("send_batch failed: {err}");
        }
        drop(outbound_refs);

        with_transport(&mut self.transport, |t| t.do_work());
        let events = with_transport(&mut self.transport, |t| t.poll_events()).unwrap_or_default();
        self.handle_transport_events(events);
    }

    fn handle_transport_events(&mut self, events: Vec<TransportEvent>) {
        for event in events {
            match event {
                TransportEvent::SendBatchComplete { ids, result } => {
                    for completed in self.outbound.complete_batch(&ids, result) {
                        if let Some(callback) = completed.callback {
                            callback(completed.result);
                        }
                    }
                }
                TransportEvent::TwinReportedStateAck { item_id, status_code } => {
                    if let Some((callback, status)) = self.twin.acknowledge(item_id, status_code) {
                        if let Some(callback) = callback {
                            callback(status);
                        }
                    }
                }
                TransportEvent::DesiredPropertyUpdate { state, payload } => {
                    self.deliver_twin_update(state, payload);
                }
                TransportEvent::GetTwinComplete { token, payload, .. } => {
                    self.complete_twin_update_encountered = true;
                    if let Some(callback) = self.get_twin_one_shots.remove(&token) {
                        callback(payload);
                    }
                }
                TransportEvent::ConnectionStatusChanged { status, reason } => {
                    self.emit_connection_status(status, reason);
                }
                TransportEvent::MessageReceived { message } => {
                    let resolved = self.input_routes.resolve(&message.input_name);
                    let (accepted, disposition) =
                        dispatch_message(&mut self.message_callback, resolved, &message);
                    if accepted {
                        if let Some(disposition) = disposition {
                            let result = with_transport(&mut self.transport, |t| {
                                t.send_message_disposition(&message, disposition)
                            });
                            if let Some(Err(err)) = result {
                                log::warn!("failed to forward disposition: {err}");
                            }
                        }
                    }
                    self.last_message_receive_time = Some(SystemTime::now());
                }
                TransportEvent::MethodInvoked {
                    method_name,
                    payload,
                    handle,
                } => {
                    let method_callback = &mut self.method_callback;
                    let outcome = match self.transport.as_mut() {
                        Some(TransportHandle::Owned(t)) => Some(dispatch_sync(
                            method_callback,
                            t.as_mut(),
                            handle,
                            &method_name,
                            &payload,
                        )),
                        Some(TransportHandle::Shared(t)) => Some(dispatch_sync(
                            method_callback,
                            &mut *t.borrow_mut(),
                            handle,
                            &method_name,
                            &payload,
                        )),
                        None => None,
                    };
                    match outcome {
                        Some(MethodDispatchOutcome::Unhandled) => {
                            log::debug!("no method handler registered for '{method_name}'");
                        }
                        Some(MethodDispatchOutcome::SyncForwarded(Err(err))) => {
                            log::warn!("method response forward failed: {err}");
                        }
                        Some(MethodDispatchOutcome::SyncRejectedEmptyResponse) => {
                            log::warn!("method handler for '{method_name}' returned an empty response");
                        }
                        _ => {}
                    }
                }
            }
        }
    }

    // ---- 4.10 teardown --------------------------------------------------------

    /// Idempotent with respect to already-torn-down state. Completes every
    /// still-queued outbound entry with `BECAUSE_DESTROY`; twin entries are
    /// dropped without firing callbacks, matching §4.10.
    pub fn destroy(mut self) {
        for completed in self.outbound.drain_for_destroy() {
            if let Some(callback) = completed.callback {
                callback(completed.result);
            }
        }
        self.twin.drain_for_destroy();

        if self.registration_state == RegistrationState::Attached {
            let _ = with_transport(&mut self.transport, |t| t.unregister_device());
        }
        // `self.transport` drops here: `Owned` drops (and destroys) the
        // transport; `Shared` only drops this client's `Rc` handle, per
        // `is_shared_transport`.
    }
}
