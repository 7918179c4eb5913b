#![allow(non_snake_case)]

use joint_client::{
    ConnectError,
    ConnectionState,
    PendingTx,
    TxKind,
    TxSlot,
    WalletEvent,
    connector::LOCKED_REASON,
    test_helpers::{
        ALICE,
        SONIC_CHAIN_ID,
        TestContext,
        addr,
    },
};
use std::time::Duration;

const POLL: Duration = Duration::from_secs(1);

#[tokio::test(start_paused = true)]
async fn connect__publishes_connected_state_to_watchers() {
    let ctx = TestContext::new(POLL);
    let mut connection = ctx.session().watch_connection();

    // when
    ctx.session().connect().await.unwrap();

    // then
    connection.changed().await.unwrap();
    assert_eq!(
        connection.borrow_and_update().state,
        ConnectionState::Connected {
            account: ALICE,
            chain_id: SONIC_CHAIN_ID
        }
    );
}

#[tokio::test(start_paused = true)]
async fn chain_changed__wallet_event_rebinds_write_handle() {
    let ctx = TestContext::new(POLL);
    ctx.session().connect().await.unwrap();
    let before = ctx.session().write_handle().unwrap();
    let epoch_before = ctx.session().connection().epoch;
    let mut connection = ctx.session().watch_connection();

    // when
    ctx.wallet().emit(WalletEvent::ChainChanged(SONIC_CHAIN_ID));
    connection
        .wait_for(|c| c.epoch > epoch_before && c.state.is_connected())
        .await
        .unwrap();

    // then
    let after = ctx.session().write_handle().unwrap();
    assert_ne!(before.id(), after.id());
    assert!(after.epoch() > before.epoch());
}

#[tokio::test(start_paused = true)]
async fn chain_changed__to_foreign_chain_blocks_writes() {
    let ctx = TestContext::new(POLL);
    ctx.session().connect().await.unwrap();
    let mut connection = ctx.session().watch_connection();

    // when
    ctx.wallet().set_chain_id(1);
    ctx.wallet().emit(WalletEvent::ChainChanged(1));
    connection
        .wait_for(|c| matches!(c.state, ConnectionState::Failed { .. }))
        .await
        .unwrap();

    // then
    let err = ctx.session().submit(TxKind::Claim).await.unwrap_err();
    assert_eq!(err, joint_client::TxError::NotConnected);
    assert_eq!(ctx.joint().calls("yoink"), 0);
}

#[tokio::test(start_paused = true)]
async fn accounts_changed__empty_list_clears_pending_transactions() {
    let ctx = TestContext::new(POLL);
    ctx.session().connect().await.unwrap();
    ctx.joint().hold_writes();
    let mut connection = ctx.session().watch_connection();
    let interrupt = async {
        while ctx.joint().calls("yoink") == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(ctx.session().pending(TxSlot::Claim), PendingTx::Submitted);

        // when
        ctx.wallet().emit(WalletEvent::AccountsChanged(vec![]));
        connection
            .wait_for(|c| {
                c.state
                    == ConnectionState::Failed {
                        reason: LOCKED_REASON.to_string(),
                    }
            })
            .await
            .unwrap();
        // let the reconcile task observe the same change
        tokio::time::sleep(Duration::from_millis(1)).await;
        let pending = ctx.session().pending(TxSlot::Claim);
        ctx.joint().release_writes();
        pending
    };

    let (result, pending_after_lock) =
        tokio::join!(ctx.session().submit(TxKind::Claim), interrupt);

    // then
    assert!(result.is_ok());
    assert_eq!(pending_after_lock, PendingTx::Idle);
    assert_eq!(ctx.session().pending(TxSlot::Claim), PendingTx::Idle);
    assert!(ctx.session().write_handle().is_err());
}

#[tokio::test(start_paused = true)]
async fn accounts_changed__switch_keeps_connection_with_new_account() {
    let ctx = TestContext::new(POLL);
    ctx.session().connect().await.unwrap();
    let mut connection = ctx.session().watch_connection();

    // when
    ctx.wallet()
        .emit(WalletEvent::AccountsChanged(vec![addr(0xbb)]));
    connection
        .wait_for(|c| c.state.account() == Some(addr(0xbb)))
        .await
        .unwrap();

    // then
    let handle = ctx.session().write_handle().unwrap();
    assert_eq!(handle.account(), addr(0xbb));
}

#[tokio::test(start_paused = true)]
async fn connect__rejected_authorization_reports_user_rejected() {
    let ctx = TestContext::new(POLL);
    ctx.wallet().set_accounts(Err(joint_client::WalletError::Rejected(
        "user closed the prompt".into(),
    )));

    let err = ctx.session().connect().await.unwrap_err();

    assert_eq!(err, ConnectError::UserRejected);
    assert!(matches!(
        ctx.session().connection().state,
        ConnectionState::Failed { .. }
    ));
}
