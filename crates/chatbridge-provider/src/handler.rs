//! Per-connection handling: the auth gate, dispatch and cleanup.

use std::sync::Arc;

use chatbridge_net::Incoming;
use chatbridge_protocol::{BaseMsg, CmdMsg, Codec, JsonCodec};
use chatbridge_service::dispatch_msg;
use chatbridge_transport::{StreamTransport, Transport};
use futures_util::StreamExt;

use crate::server::ProviderState;

/// Type and node of the message confirming `provider-auth`.
pub const PROVIDER_AUTH_INFO: &str = "info/provider.auth";

/// What the gate decided about one pre-auth frame.
enum Gate {
    /// Stay unauthenticated; the reply has been published.
    Rejected,
    /// Authenticated by `provider-auth`; the frame is consumed.
    Authenticated,
    /// Authenticated by the bootstrap skip; the frame is processed.
    Skipped,
}

pub(crate) async fn handle_connection(incoming: Incoming, state: Arc<ProviderState>) {
    let peer = incoming.peer().to_string();
    let handshake = tokio::select! {
        result = incoming.establish(state.options.handshake_timeout()) => Some(result),
        () = state.stop.cancelled() => None,
        () = state.service.done().wait() => None,
    };
    let conn = match handshake {
        Some(Ok(conn)) => conn,
        Some(Err(e)) => {
            tracing::warn!(%peer, error = %e, "handshake failed");
            if state.release() && state.established.is_cancelled() {
                exit_if_auto(&state).await;
            }
            return;
        }
        None => {
            state.release();
            return;
        }
    };
    state.established.cancel();

    let (conn_id, mut inbound, outbound) = conn.into_parts();

    let (tp, writer) = StreamTransport::spawn_sink(state.service.protocol(), outbound);
    let tp: Arc<dyn Transport> = Arc::new(tp);
    if let Err(e) = tp.advertise() {
        tracing::warn!(%conn_id, error = %e, "transport advertise failed");
    }

    let mut authed = !state.gate.wants_auth();
    if authed {
        state.transport.add_transport(Arc::clone(&tp));
    }
    tracing::info!(%conn_id, %peer, authed, "connection opened");

    let mut read_err = None;
    loop {
        let frame = tokio::select! {
            frame = inbound.next() => frame,
            () = state.service.done().wait() => break,
        };
        let data = match frame {
            Some(Ok(data)) => data,
            Some(Err(e)) => {
                read_err = Some(e);
                break;
            }
            None => break,
        };
        if data.is_empty() {
            continue;
        }

        if !authed {
            match check_auth(&state, &tp, &data) {
                Gate::Rejected => continue,
                Gate::Authenticated => {
                    authed = true;
                    tracing::info!(%conn_id, "connection authenticated");
                    continue;
                }
                Gate::Skipped => {
                    authed = true;
                    tracing::info!(%conn_id, "connection authenticated by bootstrap skip");
                }
            }
        }

        tracing::debug!(%conn_id, len = data.len(), "dispatching message");
        if let Err(e) = dispatch_msg(&*state.service, &data).await {
            state.service.generic_error(&e);
        }
    }

    state.transport.remove_transport(&tp);
    if let Some(e) = read_err {
        tracing::debug!(%conn_id, error = %e, "connection read failed");
        state.service.generic_error(&e);
    }
    if let Err(e) = tp.close() {
        tracing::debug!(%conn_id, error = %e, "transport close failed");
    }
    match writer.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::debug!(%conn_id, error = %e, "connection writer failed"),
        Err(e) => tracing::error!(%conn_id, error = %e, "connection writer panicked"),
    }
    tracing::info!(%conn_id, %peer, "connection closed");

    if state.release() {
        exit_if_auto(&state).await;
    }
}

/// Called when the last connection has gone.
async fn exit_if_auto(state: &ProviderState) {
    if !state.options.auto_exit {
        return;
    }
    tracing::info!("last connection closed, exiting");
    state.stop.cancel();
    if let Err(e) = state.service.close().await {
        tracing::warn!(error = %e, "service close failed");
    }
}

/// Runs one frame from an unauthenticated connection through the gate.
///
/// Replies go only to the connection's own transport; nothing reaches the
/// fan-out before authentication.
fn check_auth(state: &ProviderState, tp: &Arc<dyn Transport>, data: &[u8]) -> Gate {
    let reject = |id: &str, network: &str, err: &str| {
        if let Err(e) = tp.publish_error(id, network, &err) {
            tracing::debug!(error = %e, "pre-auth reply failed");
        }
        Gate::Rejected
    };

    let msg: CmdMsg = match JsonCodec.decode(data) {
        Ok(msg) => msg,
        Err(e) => return reject("", "", &e.to_string()),
    };

    if msg.is_type("cmd") && msg.command == "provider-auth" {
        if msg.args.len() != 1 {
            return reject(&msg.id, &msg.net.id, "unexpected command args");
        }
        if !msg.net.id.is_empty() {
            return reject(&msg.id, &msg.net.id, "cannot provider-auth to a network");
        }
        if !state.gate.check(&msg.args[0]) {
            return reject(&msg.id, &msg.net.id, "authentication failed");
        }

        state.transport.add_transport(Arc::clone(tp));
        let mut reply = BaseMsg::new(msg.id.clone(), PROVIDER_AUTH_INFO, state.transport.protocol());
        reply.message.set_text("authenticated");
        if let Err(e) = tp.publish("", "", PROVIDER_AUTH_INFO, &reply.into()) {
            tracing::debug!(error = %e, "auth confirmation failed");
        }
        return Gate::Authenticated;
    }

    if state.gate.check_skip() {
        state.transport.add_transport(Arc::clone(tp));
        return Gate::Skipped;
    }
    reject(
        &msg.id,
        &msg.net.id,
        "must authenticate with the provider first (provider-auth)",
    )
}
