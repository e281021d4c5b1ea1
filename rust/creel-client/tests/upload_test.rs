//! End-to-end saga tests against an in-memory fake of the upload
//! service, the storage provider and the receipt endpoint.

use async_trait::async_trait;
use creel_client::{
    DelegationStore, ExecutionRequest, ExecutionResponse, PollConfig, ReceiptClient,
    ServiceConfig,
    blob::{AcceptOk, AddArguments, AddOk, BlobAddress, BlobDigest, LocationArguments, TaskRef},
    channel::{BlobTransport, Channel, ChannelError},
    receipt::ReceiptEndpoint,
    upload::{ProgressSink, UploadError, UploadEvent, UploadOrchestrator},
};
use creel_storage::MemoryStorageBackend;
use creel_ucan::{
    Command, Delegation, Ed25519Signer, Invocation, Receipt, Subject,
    container::{Container, Token},
    receipt::Outcome,
    signer::Principal,
};
use ipld_core::{cid::Cid, ipld::Ipld};
use std::{
    collections::{BTreeMap, HashMap, HashSet},
    sync::{Arc, Mutex},
    time::Duration,
};
use testresult::TestResult;
use url::Url;

fn signer(seed: u8) -> Ed25519Signer {
    Ed25519Signer::from_seed(&[seed; 32])
}

fn args_map<T: serde::Serialize>(value: &T) -> BTreeMap<String, Ipld> {
    let Ipld::Map(map) = ipld_core::serde::to_ipld(value).unwrap() else {
        panic!("arguments must encode to a map");
    };
    map
}

fn ok_outcome<T: serde::Serialize>(value: &T) -> Outcome {
    Outcome::Ok(ipld_core::serde::to_ipld(value).unwrap())
}

#[derive(Default)]
struct NetworkState {
    stored: HashSet<Vec<u8>>,
    pending: HashMap<Cid, ExecutionResponse>,
    puts: usize,
    polls: usize,
    submitted_receipts: usize,
    put_failure: Option<(u16, String)>,
    omit_put_invocation: bool,
}

/// A fake of everything on the far side of the wire: the upload
/// service, the short-lived storage provider, and the receipt endpoint.
#[derive(Clone)]
struct FakeNetwork {
    service: Ed25519Signer,
    provider_seed: [u8; 32],
    state: Arc<Mutex<NetworkState>>,
}

impl FakeNetwork {
    fn new(service: Ed25519Signer) -> Self {
        Self {
            service,
            provider_seed: [77; 32],
            state: Arc::new(Mutex::new(NetworkState::default())),
        }
    }

    fn provider(&self) -> Ed25519Signer {
        Ed25519Signer::from_seed(&self.provider_seed)
    }

    fn handle_add(&self, invocation: &Invocation) -> ExecutionResponse {
        let add_args: AddArguments =
            ipld_core::serde::from_ipld(invocation.arguments_ipld()).unwrap();
        let digest = add_args.blob.digest.clone();
        let space = invocation.subject().clone();
        let provider = self.provider();

        let mut state = self.state.lock().unwrap();
        let already_stored = state.stored.contains(&digest.to_multihash_bytes());

        // The service runs /blob/allocate against the provider and
        // reflects both the sub-invocation and its receipt back to us.
        let allocate_invocation = Invocation::builder()
            .issuer(self.service.clone())
            .audience(provider.did().clone())
            .subject(space.clone())
            .command(Command::from_static(&["blob", "allocate"]))
            .arguments(args_map(&AddArguments {
                blob: add_args.blob.clone(),
            }))
            .try_build()
            .unwrap();
        let address = (!already_stored).then(|| BlobAddress {
            url: Url::parse(&format!("http://provider.test/blob/{digest}")).unwrap(),
            headers: [("x-test".to_string(), "yes".to_string())].into(),
        });
        let allocate_receipt = Receipt::issue(
            &provider,
            allocate_invocation.to_link().unwrap(),
            ok_outcome(&creel_client::blob::AllocateOk { address }),
        )
        .unwrap();

        // The provider hands over an /http/put task along with its own
        // signing key so the client can complete the task for it.
        let put_invocation = Invocation::builder()
            .issuer(provider.clone())
            .subject(space.clone())
            .command(Command::from_static(&["http", "put"]))
            .meta(
                [(
                    "keys".to_string(),
                    Ipld::Map(
                        [(
                            provider.did().to_string(),
                            Ipld::Bytes(self.provider_seed.to_vec()),
                        )]
                        .into(),
                    ),
                )]
                .into(),
            )
            .try_build()
            .unwrap();

        // The asynchronous /blob/accept task, whose receipt will be
        // served by the receipt endpoint once polled.
        let accept_invocation = Invocation::builder()
            .issuer(self.service.clone())
            .subject(space.clone())
            .command(Command::from_static(&["blob", "accept"]))
            .try_build()
            .unwrap();
        let accept_task = accept_invocation.to_link().unwrap();

        let commitment = Invocation::builder()
            .issuer(provider.clone())
            .subject(space)
            .command(Command::from_static(&["assert", "location"]))
            .arguments(args_map(&LocationArguments {
                location: vec![
                    Url::parse(&format!("http://provider.test/retrieve/{digest}")).unwrap(),
                ],
            }))
            .try_build()
            .unwrap();
        let accept_receipt = Receipt::issue(
            &self.service,
            accept_task,
            ok_outcome(&AcceptOk {
                site: commitment.to_link().unwrap(),
            }),
        )
        .unwrap();
        state.pending.insert(
            accept_task,
            ExecutionResponse::new(vec![accept_receipt], vec![commitment]),
        );

        let add_receipt = Receipt::issue(
            &self.service,
            invocation.to_link().unwrap(),
            ok_outcome(&AddOk {
                site: TaskRef { task: accept_task },
            }),
        )
        .unwrap();

        let mut invocations = vec![allocate_invocation, accept_invocation];
        if !state.omit_put_invocation {
            invocations.push(put_invocation);
        }
        ExecutionResponse::new(vec![add_receipt, allocate_receipt], invocations)
    }
}

#[async_trait]
impl Channel for FakeNetwork {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionResponse, ChannelError> {
        let container = Container::from_bytes(&request.to_bytes()?)?;
        let tokens = container.decode_tokens()?;
        match tokens.first() {
            Some(Token::Invocation(invocation)) => Ok(self.handle_add(invocation)),
            Some(Token::Receipt(_)) => {
                self.state.lock().unwrap().submitted_receipts += 1;
                Ok(ExecutionResponse::default())
            }
            _ => Err(ChannelError::Status {
                status: 400,
                body: "expected an invocation or a receipt".to_string(),
            }),
        }
    }
}

#[async_trait]
impl BlobTransport for FakeNetwork {
    async fn put(&self, _address: &BlobAddress, data: &[u8]) -> Result<(), UploadError> {
        let mut state = self.state.lock().unwrap();
        state.puts += 1;
        if let Some((status, body)) = state.put_failure.clone() {
            return Err(UploadError::TransferFailed { status, body });
        }
        state
            .stored
            .insert(BlobDigest::digest(data).to_multihash_bytes());
        Ok(())
    }
}

#[async_trait]
impl ReceiptEndpoint for FakeNetwork {
    async fn fetch(&self, task: &Cid) -> Result<Option<ExecutionResponse>, ChannelError> {
        let mut state = self.state.lock().unwrap();
        state.polls += 1;
        Ok(state.pending.get(task).cloned())
    }
}

#[derive(Clone, Default)]
struct RecordingSink(Arc<Mutex<Vec<UploadEvent>>>);

impl ProgressSink for RecordingSink {
    fn emit(&self, event: UploadEvent) {
        self.0.lock().unwrap().push(event);
    }
}

struct Harness {
    orchestrator: UploadOrchestrator<
        MemoryStorageBackend<String, Vec<u8>>,
        FakeNetwork,
        FakeNetwork,
        FakeNetwork,
        RecordingSink,
    >,
    network: FakeNetwork,
    events: RecordingSink,
    space: Ed25519Signer,
}

/// Wire an orchestrator to a fresh fake network, with a space whose
/// top authority is delegated to the identity (what `space create`
/// leaves behind).
async fn harness() -> Harness {
    let identity = signer(1);
    let space = signer(2);
    let service = signer(3);
    let network = FakeNetwork::new(service.clone());

    let mut store = DelegationStore::new(MemoryStorageBackend::default());
    let top = Delegation::builder()
        .issuer(space.clone())
        .audience(identity.did().clone())
        .subject(Subject::Specific(space.did().clone()))
        .command(Command::top())
        .try_build()
        .unwrap();
    store.put(&top).await.unwrap();

    let events = RecordingSink::default();
    let orchestrator = UploadOrchestrator::new(
        identity.clone(),
        ServiceConfig {
            id: service.did().clone(),
            url: Url::parse("http://upload.test").unwrap(),
        },
        store,
        network.clone(),
        network.clone(),
        ReceiptClient::new(
            network.clone(),
            PollConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_millis(500),
            },
        ),
        events.clone(),
    );

    Harness {
        orchestrator,
        network,
        events,
        space,
    }
}

#[tokio::test]
async fn a_first_upload_transfers_and_reaches_a_committed_location() -> TestResult {
    let h = harness().await;
    let data = b"the quick brown fox";

    let outcome = h.orchestrator.upload(h.space.did(), data).await?;

    assert!(!outcome.skipped);
    assert_eq!(outcome.digest, BlobDigest::digest(data));
    assert_eq!(outcome.size, data.len() as u64);
    assert_eq!(outcome.locations.len(), 1);
    assert_eq!(outcome.content, BlobDigest::digest(data).content_link());

    let state = h.network.state.lock().unwrap();
    assert_eq!(state.puts, 1);
    assert_eq!(state.submitted_receipts, 1);
    assert!(state.polls >= 1);
    Ok(())
}

#[tokio::test]
async fn uploading_the_same_content_twice_skips_the_transfer() -> TestResult {
    let h = harness().await;
    let data = b"idempotent bytes";

    let first = h.orchestrator.upload(h.space.did(), data).await?;
    assert!(!first.skipped);

    let second = h.orchestrator.upload(h.space.did(), data).await?;
    assert!(second.skipped);
    assert_eq!(second.locations.len(), 1);

    let state = h.network.state.lock().unwrap();
    // One physical transfer and one transfer receipt across both runs.
    assert_eq!(state.puts, 1);
    assert_eq!(state.submitted_receipts, 1);
    drop(state);

    let events = h.events.0.lock().unwrap();
    assert!(
        events
            .iter()
            .any(|e| matches!(e, UploadEvent::AlreadyStored { .. }))
    );
    Ok(())
}

#[tokio::test]
async fn a_rejected_transfer_aborts_before_receipts_and_polling() -> TestResult {
    let h = harness().await;
    h.network.state.lock().unwrap().put_failure = Some((503, "disk full".to_string()));

    let error = h
        .orchestrator
        .upload(h.space.did(), b"doomed bytes")
        .await
        .expect_err("the saga must abort on a failed transfer");

    match error {
        UploadError::TransferFailed { status, body } => {
            assert_eq!(status, 503);
            assert_eq!(body, "disk full");
        }
        other => panic!("expected TransferFailed, got {other:?}"),
    }

    let state = h.network.state.lock().unwrap();
    assert_eq!(state.submitted_receipts, 0);
    assert_eq!(state.polls, 0);
    Ok(())
}

#[tokio::test]
async fn an_unknown_space_is_a_precondition_failure() -> TestResult {
    let h = harness().await;
    let stranger = signer(42);

    let error = h
        .orchestrator
        .upload(stranger.did(), b"unauthorized bytes")
        .await
        .expect_err("no chain exists for the stranger space");

    match error {
        UploadError::NotAuthorized { command, space } => {
            assert_eq!(command.to_string(), "/blob/add");
            assert_eq!(&space, stranger.did());
        }
        other => panic!("expected NotAuthorized, got {other:?}"),
    }

    assert_eq!(h.network.state.lock().unwrap().polls, 0);
    Ok(())
}

#[tokio::test]
async fn a_response_without_the_put_invocation_is_a_protocol_violation() -> TestResult {
    let h = harness().await;
    h.network.state.lock().unwrap().omit_put_invocation = true;

    let error = h
        .orchestrator
        .upload(h.space.did(), b"bytes with nowhere to go")
        .await
        .expect_err("the missing sub-invocation must be terminal");

    match error {
        UploadError::Protocol(message) => {
            assert!(message.contains("/http/put"), "got: {message}");
        }
        other => panic!("expected Protocol, got {other:?}"),
    }

    // The saga died before receipt submission.
    assert_eq!(h.network.state.lock().unwrap().submitted_receipts, 0);
    Ok(())
}

#[tokio::test]
async fn uploads_work_through_a_powerline_delegation_chain() -> TestResult {
    // space -> laptop (specific subject), laptop -> phone (powerline).
    // The phone uploads into the space through the two-hop chain.
    let space = signer(11);
    let laptop = signer(12);
    let phone = signer(13);
    let service = signer(14);
    let network = FakeNetwork::new(service.clone());

    let mut store = DelegationStore::new(MemoryStorageBackend::default());
    store
        .put(
            &Delegation::builder()
                .issuer(space.clone())
                .audience(laptop.did().clone())
                .subject(Subject::Specific(space.did().clone()))
                .command(Command::top())
                .try_build()?,
        )
        .await?;
    store
        .put(
            &Delegation::builder()
                .issuer(laptop.clone())
                .audience(phone.did().clone())
                .subject(Subject::Any)
                .command(Command::from_static(&["blob"]))
                .try_build()?,
        )
        .await?;

    let orchestrator = UploadOrchestrator::new(
        phone.clone(),
        ServiceConfig {
            id: service.did().clone(),
            url: Url::parse("http://upload.test").unwrap(),
        },
        store,
        network.clone(),
        network.clone(),
        ReceiptClient::new(
            network.clone(),
            PollConfig {
                interval: Duration::from_millis(1),
                timeout: Duration::from_millis(500),
            },
        ),
        RecordingSink::default(),
    );

    let outcome = orchestrator.upload(space.did(), b"from the phone").await?;
    assert!(!outcome.skipped);
    Ok(())
}
