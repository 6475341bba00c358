//! The per-connection `russh` server handler: public-key authentication
//! against the cluster identity store, and bridging of accepted sessions
//! into the target container via the pod-exec streaming endpoint.

use std::collections::HashMap;

use futures::SinkExt;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, api::AttachParams};
use russh::{
    Channel, ChannelId, Pty,
    server::{Auth, Msg, Session},
};
use skpr_ssh_core::{
    SessionKey, SessionMode, StoreClient, TerminalSize,
    resize::{ResizeProducer, ResizeQueue},
};
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    sync::mpsc,
};

/// One `Handler` is created per accepted TCP connection; `russh` drives it
/// for the lifetime of that connection.
pub struct GatewayHandler {
    kube_client: kube::Client,
    shell: Vec<String>,
    peer_addr: String,
    username: String,
    channels: HashMap<ChannelId, ChannelState>,
}

#[derive(Default)]
struct ChannelState {
    channel: Option<Channel<Msg>>,
    pty_size: Option<TerminalSize>,
    resize_producer: Option<ResizeProducer>,
    stdin_tx: Option<mpsc::Sender<Vec<u8>>>,
}

impl GatewayHandler {
    #[must_use]
    pub fn new(kube_client: kube::Client, shell: Vec<String>, peer_addr: String) -> Self {
        Self { kube_client, shell, peer_addr, username: String::new(), channels: HashMap::new() }
    }
}

impl russh::server::Handler for GatewayHandler {
    type Error = russh::Error;

    async fn auth_publickey(
        &mut self,
        user: &str,
        public_key: &russh::keys::PublicKey,
    ) -> Result<Auth, Self::Error> {
        let Ok(key) = skpr_ssh_core::username::parse(user) else {
            tracing::warn!(peer_addr = %self.peer_addr, user, "rejecting malformed username");
            return Ok(reject());
        };

        let store = StoreClient::new(self.kube_client.clone(), key.namespace.clone());
        let record = match store.get(&key.principal).await {
            Ok(record) => record,
            Err(error) => {
                tracing::warn!(
                    peer_addr = %self.peer_addr,
                    namespace = %key.namespace,
                    principal = %key.principal,
                    %error,
                    "identity lookup failed"
                );
                return Ok(reject());
            }
        };

        let matched = matches_authorized_keys(&record.spec.authorized_keys, public_key, |error| {
            tracing::warn!(
                peer_addr = %self.peer_addr,
                namespace = %key.namespace,
                principal = %key.principal,
                %error,
                "skipping unparseable authorized_keys line"
            );
        });

        if matched {
            tracing::info!(
                peer_addr = %self.peer_addr,
                namespace = %key.namespace,
                pod = %key.pod,
                container = %key.container,
                principal = %key.principal,
                "accepted public key"
            );
            self.username = user.to_string();
            Ok(Auth::Accept)
        } else {
            tracing::warn!(
                peer_addr = %self.peer_addr,
                namespace = %key.namespace,
                principal = %key.principal,
                "no authorized key matched"
            );
            Ok(reject())
        }
    }

    async fn channel_open_session(
        &mut self,
        channel: Channel<Msg>,
        _session: &mut Session,
    ) -> Result<bool, Self::Error> {
        self.channels.insert(channel.id(), ChannelState { channel: Some(channel), ..Default::default() });
        Ok(true)
    }

    async fn pty_request(
        &mut self,
        channel_id: ChannelId,
        _term: &str,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _modes: &[(Pty, u32)],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel_id) {
            state.pty_size =
                Some(TerminalSize { rows: row_height as u16, cols: col_width as u16 });
        }
        session.channel_success(channel_id)?;
        Ok(())
    }

    async fn shell_request(
        &mut self,
        channel_id: ChannelId,
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let shell = self.shell.clone();
        self.start_session(channel_id, Vec::new(), shell, session);
        Ok(())
    }

    async fn exec_request(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        session: &mut Session,
    ) -> Result<(), Self::Error> {
        let command = shell_words::split(&String::from_utf8_lossy(data)).unwrap_or_else(|_| {
            data.split(|&b| b == b' ').map(|s| String::from_utf8_lossy(s).into_owned()).collect()
        });
        self.start_session(channel_id, command, Vec::new(), session);
        Ok(())
    }

    async fn window_change_request(
        &mut self,
        channel_id: ChannelId,
        col_width: u32,
        row_height: u32,
        _pix_width: u32,
        _pix_height: u32,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get(&channel_id) {
            if let Some(producer) = &state.resize_producer {
                producer.push(TerminalSize { rows: row_height as u16, cols: col_width as u16 });
            }
        }
        Ok(())
    }

    async fn data(
        &mut self,
        channel_id: ChannelId,
        data: &[u8],
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get(&channel_id) {
            if let Some(tx) = &state.stdin_tx {
                let _ = tx.send(data.to_vec()).await;
            }
        }
        Ok(())
    }

    async fn channel_eof(
        &mut self,
        channel_id: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        if let Some(state) = self.channels.get_mut(&channel_id) {
            state.stdin_tx = None;
        }
        Ok(())
    }

    async fn channel_close(
        &mut self,
        channel_id: ChannelId,
        _session: &mut Session,
    ) -> Result<(), Self::Error> {
        let _ = self.channels.remove(&channel_id);
        Ok(())
    }
}

fn reject() -> Auth { Auth::Reject { proceed_with_methods: None, partial_success: false } }

/// Returns whether `candidate` byte-exact-matches any parseable line in
/// `authorized_keys`. An unparseable line is skipped rather than aborting
/// the whole scan; `on_parse_error` is invoked with that line's parse error
/// for logging, and ignored entirely by callers (such as tests) that don't
/// care about it.
fn matches_authorized_keys(
    authorized_keys: &[String],
    candidate: &russh::keys::PublicKey,
    mut on_parse_error: impl FnMut(russh::keys::Error),
) -> bool {
    authorized_keys.iter().any(|line| match russh::keys::PublicKey::from_openssh(line) {
        Ok(parsed) => &parsed == candidate,
        Err(error) => {
            on_parse_error(error);
            false
        }
    })
}

impl GatewayHandler {
    /// Classifies the session, opens the pod-exec stream, and spawns the
    /// stream bridge. Called from both `shell_request` (empty `explicit`
    /// command, shell substituted) and `exec_request` (explicit command,
    /// shell empty).
    fn start_session(
        &mut self,
        channel_id: ChannelId,
        explicit_command: Vec<String>,
        shell_command: Vec<String>,
        session: &mut Session,
    ) {
        let Some(state) = self.channels.get_mut(&channel_id) else { return };
        let Some(channel) = state.channel.take() else { return };

        // Re-derive the session coordinates from the raw username rather than
        // trusting only the value `auth_publickey` cached: a session request
        // that somehow reaches this point without a valid parse must still
        // surface the same `UsernameParse` failure text and exit 1.
        let key = match skpr_ssh_core::username::parse(&self.username) {
            Ok(key) => key,
            Err(error) => {
                let _handle = tokio::spawn(fail_channel(channel, error.to_string()));
                return;
            }
        };

        let mode = SessionMode::classify(&explicit_command);
        let command = if shell_command.is_empty() { explicit_command } else { shell_command };
        let pty_size = state.pty_size.unwrap_or(TerminalSize { rows: 24, cols: 80 });

        let (stdin_tx, stdin_rx) = mpsc::channel::<Vec<u8>>(64);
        if mode.wants_stdin() {
            state.stdin_tx = Some(stdin_tx);
        }

        let (resize_producer, resize_queue) = ResizeQueue::new(pty_size);
        if mode.wants_pty() {
            state.resize_producer = Some(resize_producer);
        }

        let kube_client = self.kube_client.clone();
        let peer_addr = self.peer_addr.clone();
        let _ = session.channel_success(channel_id);

        let _handle = tokio::spawn(bridge_session(
            kube_client,
            key,
            mode,
            command,
            channel,
            stdin_rx,
            resize_queue,
            peer_addr,
        ));
    }
}

async fn fail_channel(channel: Channel<Msg>, message: String) {
    let _ = channel.data(format!("{message}\n").as_bytes()).await;
    let _ = channel.exit_status(1).await;
    let _ = channel.close().await;
}

#[allow(clippy::too_many_arguments)]
async fn bridge_session(
    kube_client: kube::Client,
    key: SessionKey,
    mode: SessionMode,
    command: Vec<String>,
    channel: Channel<Msg>,
    mut stdin_rx: mpsc::Receiver<Vec<u8>>,
    mut resize_queue: ResizeQueue,
    peer_addr: String,
) {
    let url = skpr_ssh_core::store::exec_url(
        &key.namespace,
        &key.pod,
        &key.container,
        &command,
        mode.wants_stdin(),
        mode.wants_pty(),
    );
    tracing::info!(peer_addr = %peer_addr, %url, "opening pod exec stream");

    let api: Api<Pod> = Api::namespaced(kube_client, &key.namespace);
    let attach_params = AttachParams {
        container: Some(key.container.clone()),
        stdin: mode.wants_stdin(),
        stdout: true,
        stderr: true,
        tty: mode.wants_pty(),
        ..AttachParams::default()
    };

    let mut attached = match api.exec(&key.pod, command, &attach_params).await {
        Ok(attached) => attached,
        Err(error) => {
            fail_channel(channel, format!("failed to open remote session: {error}")).await;
            return;
        }
    };

    if mode.wants_pty() {
        if let Some(mut term_tx) = attached.terminal_size() {
            let _handle = tokio::spawn(async move {
                while let Some(size) = resize_queue.next().await {
                    if term_tx
                        .send(kube::api::TerminalSize { height: size.rows, width: size.cols })
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            });
        }
    }

    let exit_status_future = attached.take_status();

    let mut stdout = attached.stdout();
    let mut stderr = attached.stderr();
    let mut stdin = attached.stdin();
    let mut wants_stdin = mode.wants_stdin() && stdin.is_some();

    let mut out_buf = vec![0_u8; 8192];
    let mut err_buf = vec![0_u8; 8192];
    let mut attached_join = std::pin::pin!(attached.join());

    // Set the moment any leg of the bridge hits a real transport error, as
    // opposed to a clean EOF or the SSH side simply hanging up. Per §7
    // `StreamBridge` failures must still write error text and exit 1; a
    // closed SSH channel is not such a failure and is left to `break` quietly.
    let mut bridge_error: Option<String> = None;

    loop {
        tokio::select! {
            result = &mut attached_join => {
                if let Err(error) = result {
                    tracing::warn!(peer_addr = %peer_addr, %error, "pod exec stream ended with a transport error");
                    bridge_error = Some(format!("stream bridge error: {error}"));
                } else {
                    tracing::debug!(peer_addr = %peer_addr, "pod exec stream closed by remote");
                }
                break;
            }
            chunk = stdin_rx.recv(), if wants_stdin => {
                match chunk {
                    Some(chunk) => {
                        let Some(stdin) = stdin.as_mut() else { break };
                        if let Err(error) = stdin.write_all(&chunk).await {
                            tracing::warn!(peer_addr = %peer_addr, %error, "failed to write remote stdin");
                            bridge_error = Some(format!("stream bridge error: {error}"));
                            break;
                        }
                        if let Err(error) = stdin.flush().await {
                            tracing::warn!(peer_addr = %peer_addr, %error, "failed to flush remote stdin");
                            bridge_error = Some(format!("stream bridge error: {error}"));
                            break;
                        }
                    }
                    None => {
                        stdin = None;
                        wants_stdin = false;
                    }
                }
            }
            res = async { stdout.as_mut().unwrap().read(&mut out_buf).await }, if stdout.is_some() => {
                match res {
                    Ok(0) => stdout = None,
                    Err(error) => {
                        tracing::warn!(peer_addr = %peer_addr, %error, "failed to read remote stdout");
                        bridge_error = Some(format!("stream bridge error: {error}"));
                        break;
                    }
                    Ok(n) => {
                        if channel.data(&out_buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
            res = async { stderr.as_mut().unwrap().read(&mut err_buf).await }, if stderr.is_some() => {
                match res {
                    Ok(0) => stderr = None,
                    Err(error) => {
                        tracing::warn!(peer_addr = %peer_addr, %error, "failed to read remote stderr");
                        bridge_error = Some(format!("stream bridge error: {error}"));
                        break;
                    }
                    Ok(n) => {
                        if channel.extended_data(1, &err_buf[..n]).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    if let Some(message) = bridge_error {
        fail_channel(channel, message).await;
        return;
    }

    let exit_code = match exit_status_future {
        Some(status_future) => {
            status_future.await.as_ref().and_then(exit_code_from_status).unwrap_or(0)
        }
        None => 0,
    };

    let _ = channel.exit_status(exit_code).await;
    let _ = channel.close().await;
}

/// Pulls the process exit code out of the pod-exec protocol's terminal
/// `Status` message, if the remote surfaced one (reason `NonZeroExitCode`,
/// the exit code itself carried in a `StatusCause` with reason `ExitCode`).
/// Absence of any of this (clean exit, or a transport that never sends a
/// status) means "exit 0" per §4.2.2.
fn exit_code_from_status(status: &k8s_openapi::apimachinery::pkg::apis::meta::v1::Status) -> Option<u32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|cause| cause.reason.as_deref() == Some("ExitCode"))?
        .message
        .as_ref()?
        .parse()
        .ok()
}

#[cfg(test)]
mod tests {
    use rand::rngs::OsRng;
    use russh::keys::{Algorithm, PrivateKey};

    use super::matches_authorized_keys;

    fn keypair() -> (String, russh::keys::PublicKey) {
        let private_key = PrivateKey::random(&mut OsRng, Algorithm::Ed25519).unwrap();
        let line = private_key.public_key().to_openssh().unwrap();
        let public_key = russh::keys::PublicKey::from_openssh(&line).unwrap();
        (line, public_key)
    }

    #[test]
    fn matches_a_key_present_in_the_list() {
        let (line, public_key) = keypair();
        assert!(matches_authorized_keys(&[line], &public_key, |_| {}));
    }

    #[test]
    fn rejects_a_key_absent_from_the_list() {
        let (line_a, _public_a) = keypair();
        let (_line_b, public_b) = keypair();
        assert!(!matches_authorized_keys(&[line_a], &public_b, |_| {}));
    }

    #[test]
    fn adding_a_key_cannot_reject_a_previously_accepted_key() {
        let (line_a, public_a) = keypair();
        let (line_b, _public_b) = keypair();

        let before = vec![line_a.clone()];
        assert!(matches_authorized_keys(&before, &public_a, |_| {}));

        let after = vec![line_a, line_b];
        assert!(matches_authorized_keys(&after, &public_a, |_| {}));
    }

    #[test]
    fn removing_a_key_cannot_accept_a_previously_rejected_key() {
        let (line_a, _public_a) = keypair();
        let (_line_b, public_b) = keypair();

        let before = vec![line_a.clone()];
        assert!(!matches_authorized_keys(&before, &public_b, |_| {}));

        let after: Vec<String> = Vec::new();
        assert!(!matches_authorized_keys(&after, &public_b, |_| {}));
    }

    #[test]
    fn skips_an_unparseable_line_and_keeps_scanning() {
        let (line, public_key) = keypair();
        let authorized_keys = vec!["not an ssh key".to_string(), line];

        let mut errors = 0;
        let matched =
            matches_authorized_keys(&authorized_keys, &public_key, |_| errors += 1);

        assert!(matched);
        assert_eq!(errors, 1);
    }
}
