//! Fan-out behaviour of `MultiTransport` over in-process sinks.

use std::sync::Arc;

use chatbridge_protocol::{BaseMsg, Msg};
use chatbridge_transport::{
    LocalTransport, MultiTransport, Recorder, StreamTransport, Transport, TransportError,
};

fn ping() -> Msg {
    BaseMsg::new("1", "other/ping", "").into()
}

fn recording(protocol: &str) -> (Arc<dyn Transport>, Recorder) {
    let (tp, rec) = LocalTransport::recording(protocol);
    (Arc::new(tp), rec)
}

fn failing(text: &'static str) -> Arc<dyn Transport> {
    Arc::new(LocalTransport::new("failing", move |_: &str, _: &str, _: &str, _: &Msg| {
        Err(TransportError::Io(std::io::Error::other(text)))
    }))
}

#[test]
fn test_publish_with_no_sinks_is_ok() {
    let multi = MultiTransport::default();
    assert!(multi.publish("", "", "other", &ping()).is_ok());
}

#[test]
fn test_publish_reaches_every_sink() {
    let multi = MultiTransport::default();
    let (a, rec_a) = recording("p");
    let (b, rec_b) = recording("p");
    multi.add_transport(a);
    multi.add_transport(b);

    multi.publish("net1", "#c", "msg", &ping()).unwrap();

    assert_eq!(rec_a.len(), 1);
    assert_eq!(rec_b.len(), 1);
    assert_eq!(rec_a.snapshot()[0].network, "net1");
    assert_eq!(rec_b.snapshot()[0].chat, "#c");
}

#[test]
fn test_publish_single_failure_is_sink_error() {
    let multi = MultiTransport::default();
    let (a, rec_a) = recording("p");
    let bad = failing("second sink broke");
    let (c, rec_c) = recording("p");
    multi.add_transport(a);
    multi.add_transport(bad.clone());
    multi.add_transport(c);

    let err = multi.publish("", "", "other", &ping()).unwrap_err();
    let TransportError::Sink(single) = &err else {
        panic!("expected single sink error, got {err:?}");
    };
    assert!(Arc::ptr_eq(&single.transport, &bad));
    assert!(err.to_string().contains("second sink broke"));

    // The healthy sinks still got the message.
    assert_eq!(rec_a.len(), 1);
    assert_eq!(rec_c.len(), 1);
}

#[test]
fn test_publish_two_failures_is_multi_error() {
    let multi = MultiTransport::default();
    multi.add_transport(failing("first"));
    multi.add_transport(failing("second"));
    let (c, rec_c) = recording("p");
    multi.add_transport(c);

    let err = multi.publish("", "", "other", &ping()).unwrap_err();
    assert!(matches!(err, TransportError::Multi(_)));
    assert_eq!(err.sink_errors().len(), 2);
    assert_eq!(err.to_string(), "write failed: first (and 1 more)");
    assert_eq!(err.sink_errors()[1].to_string(), "write failed: second");
    assert_eq!(rec_c.len(), 1);
}

#[test]
fn test_remove_transport_by_identity() {
    let multi = MultiTransport::default();
    let (a, rec_a) = recording("p");
    let (b, rec_b) = recording("p");
    multi.add_transport(a.clone());
    multi.add_transport(b);

    assert!(multi.remove_transport(&a));
    assert!(!multi.remove_transport(&a));
    assert_eq!(multi.len(), 1);

    multi.publish("", "", "other", &ping()).unwrap();
    assert!(rec_a.is_empty());
    assert_eq!(rec_b.len(), 1);
}

#[test]
fn test_advertise_protocol_defaults() {
    let multi = MultiTransport::default();
    multi.advertise().unwrap();
    assert_eq!(multi.protocol(), "protocol");

    let multi = MultiTransport::default();
    let (a, _) = recording("irc");
    multi.add_transport(a);
    multi.advertise().unwrap();
    assert_eq!(multi.protocol(), "irc");

    let multi = MultiTransport::new("fixed");
    multi.advertise().unwrap();
    assert_eq!(multi.protocol(), "fixed");
}

#[test]
fn test_publish_error_goes_to_every_sink() {
    let multi = MultiTransport::new("dummy");
    let (a, rec_a) = recording("dummy");
    multi.add_transport(a);

    multi.publish_error("r1", "", &"network not found: x").unwrap();

    let items = rec_a.on_node("error");
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].text(), "network not found: x");
    assert_eq!(items[0].payload.id(), "r1");
}

#[test]
fn test_close_closes_and_clears_sinks() {
    let multi = MultiTransport::default();
    let (stream, _rx) = StreamTransport::new("p", 4);
    let stream = Arc::new(stream);
    multi.add_transport(stream.clone());

    multi.close().unwrap();
    assert!(multi.is_empty());
    assert!(stream.is_closed());
    assert!(matches!(
        stream.publish("", "", "other", &ping()),
        Err(TransportError::Closed)
    ));
}

#[test]
fn test_full_stream_sink_does_not_block_others() {
    let multi = MultiTransport::default();
    let (stream, _rx) = StreamTransport::new("p", 1);
    let (a, rec_a) = recording("p");
    multi.add_transport(Arc::new(stream));
    multi.add_transport(a);

    multi.publish("", "", "other", &ping()).unwrap();
    let err = multi.publish("", "", "other", &ping()).unwrap_err();
    assert!(matches!(
        err.sink_errors()[0].source.as_ref(),
        TransportError::QueueFull
    ));
    assert_eq!(rec_a.len(), 2);
}
