//! Purpose: Legacy (per-handle) client polling, lifecycle, and global execute.
//! Role: Drives `Tdl` in legacy mode over a synthetic native surface.
mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use common::{FakeNative, test_config, wait_until};
use serde_json::json;
use tdlbind::api::{ClientOptions, ErrorKind, InterfaceMode, NativeSurface, Tdl};

const WAIT: Duration = Duration::from_secs(2);

fn context(fake: &Arc<FakeNative>) -> Tdl {
    let native: Arc<dyn NativeSurface> = fake.clone();
    Tdl::from_surface(test_config(InterfaceMode::Legacy), native).expect("context")
}

#[test]
fn each_client_polls_its_own_handle() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let first = tdl.create_client(ClientOptions::new()).expect("first");
    let second = tdl.create_client(ClientOptions::new()).expect("second");
    assert_eq!(first.id(), None);
    assert_eq!(fake.legacy_handles(), vec![1, 2]);

    fake.push_legacy_event(2, json!({ "@type": "updateOption", "seq": 0 }));
    fake.push_legacy_event(1, json!({ "@type": "updateOption", "seq": 1 }));
    fake.push_legacy_event(1, json!({ "@type": "updateOption", "seq": 2 }));

    assert_eq!(first.next_update(WAIT).expect("update")["seq"], 1);
    assert_eq!(first.next_update(WAIT).expect("update")["seq"], 2);
    let update = second.next_update(WAIT).expect("update");
    assert_eq!(update["seq"], 0);
    assert_eq!(update["_"], "updateOption");

    // Legacy clients never touch the shared registry or loop.
    assert!(tdl.registered_client_ids().is_empty());
    assert!(!tdl.receive_loop_running());
}

#[test]
fn close_destroys_the_handle_exactly_once() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let client = tdl.create_client(ClientOptions::new()).expect("client");
    client.close();
    client.close();
    assert_eq!(fake.legacy_destroyed(), vec![1]);
    drop(client);
    assert_eq!(fake.legacy_destroyed(), vec![1]);

    let second = tdl.create_client(ClientOptions::new()).expect("second");
    second.send(json!({ "_": "getMe" })).expect("send");
    drop(second);
    assert_eq!(fake.legacy_destroyed(), vec![1, 2]);
}

#[test]
fn send_after_close_is_rejected() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let client = tdl.create_client(ClientOptions::new()).expect("client");
    client.close();
    let err = client.send(json!({ "_": "getMe" })).expect_err("closed");
    assert_eq!(err.kind(), ErrorKind::Usage);
    assert!(fake.legacy_sent().is_empty());
}

#[test]
fn close_drains_queued_updates_then_stops_waiting() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let client = tdl.create_client(ClientOptions::new()).expect("client");
    fake.push_legacy_event(1, json!({ "@type": "updateOption", "seq": 0 }));
    assert!(wait_until(WAIT, || client.try_next_update().is_some()));

    fake.push_legacy_event(1, json!({ "@type": "updateOption", "seq": 1 }));
    client.close();
    let started = Instant::now();
    while client.next_update(Duration::from_secs(5)).is_some() {}
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(fake.legacy_destroyed(), vec![1]);
}

#[test]
fn client_timeout_overrides_configured_timeout() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let custom = Duration::from_millis(35);
    let client = tdl
        .create_client(ClientOptions::new().receive_timeout(custom))
        .expect("client");
    assert!(wait_until(WAIT, || !fake.legacy_timeouts().is_empty()));
    client.close();
    assert!(fake.legacy_timeouts().iter().all(|timeout| *timeout == custom));

    let _default = tdl.create_client(ClientOptions::new()).expect("client");
    let configured = test_config(InterfaceMode::Legacy).receive_timeout;
    assert!(wait_until(WAIT, || fake.legacy_timeouts().contains(&configured)));
}

#[test]
fn invoke_works_over_a_legacy_handle() {
    let fake = FakeNative::new().auto_reply().shared();
    let tdl = context(&fake);
    let client = tdl.create_client(ClientOptions::new()).expect("client");
    let response = client
        .invoke(json!({ "_": "setOption", "name": "online" }), WAIT)
        .expect("invoke");
    assert_eq!(response["_"], "ok");

    let (handle, request) = fake.legacy_sent().pop().expect("sent");
    assert_eq!(handle, 1);
    assert_eq!(request["@type"], "setOption");
    assert!(request["@extra"].is_u64());
}

#[test]
fn execute_goes_through_the_handle_free_symbol() {
    let fake = FakeNative::new().shared();
    let tdl = context(&fake);
    let response = tdl
        .execute(json!({ "_": "getTextEntities", "text": "hi" }))
        .expect("execute")
        .expect("response");
    assert_eq!(response["_"], "textEntities");

    let executed = fake.legacy_executed();
    assert_eq!(executed.len(), 2);
    assert_eq!(executed[0].0, None);
    assert_eq!(executed[0].1["@type"], "setLogVerbosityLevel");
    assert_eq!(executed[1].0, None);
    assert_eq!(executed[1].1["@type"], "getTextEntities");
    assert!(fake.executed().is_empty());

    let client = tdl.create_client(ClientOptions::new()).expect("client");
    client
        .execute(json!({ "_": "getTextEntities", "text": "hi" }))
        .expect("client execute");
    assert_eq!(fake.legacy_executed()[2].0, Some(1));
}
