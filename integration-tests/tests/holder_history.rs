#![allow(non_snake_case)]

use alloy::primitives::Address;
use joint_client::{
    history::PastHolder,
    test_helpers::{
        TestContext,
        addr,
    },
};
use std::time::Duration;

#[tokio::test(start_paused = true)]
async fn holder_history__numbers_unique_senders_latest_first() {
    let ctx = TestContext::new(Duration::from_secs(1));

    // given
    let (a, b, c) = (addr(0xa), addr(0xb), addr(0xc));
    ctx.joint().push_transfer(Address::ZERO, a, 0, 2_000);
    ctx.joint().push_transfer(a, b, 0, 2_001);
    ctx.joint().push_transfer(b, a, 0, 2_002);
    ctx.joint().push_transfer(a, c, 0, 2_003);

    // when
    let holders = ctx.session().holder_history().await.unwrap();

    // then
    let expected = vec![
        PastHolder { rank: 2, address: b },
        PastHolder { rank: 1, address: a },
    ];
    assert_eq!(expected, holders);
    let lines: Vec<String> = holders.iter().map(ToString::to_string).collect();
    assert_eq!(lines, vec![format!("2. {b}"), format!("1. {a}")]);
}

#[tokio::test(start_paused = true)]
async fn holder_history__read_failure_is_reported() {
    let ctx = TestContext::new(Duration::from_secs(1));
    ctx.joint().fail("Transfer");

    let result = ctx.session().holder_history().await;

    assert!(result.is_err());
}
