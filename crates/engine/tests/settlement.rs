use std::{
    path::{Path, PathBuf},
    sync::{Arc, Mutex},
};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sea_orm::{ConnectOptions, ConnectionTrait, Database, DatabaseConnection, Statement};

use engine::{
    AdvanceStatus, BlobError, BlobStore, BudgetRequestBulkFilter, BudgetRequestStatus, Company,
    DeletionRequestStatus, Engine, EngineError, InvoiceListFilter, InvoiceStatus, LedgerKind,
    MoneyCents, NewAdvanceCmd, NewBudgetRequestCmd, NewInvoiceCmd, Notification,
    NotificationKind, Notifier, NotifyError, PasswordPolicy, Principal, ReviewAction, Role,
    TransferInfo,
};
use migration::MigratorTrait;
use uuid::Uuid;

const ADMIN_PASSWORD: &str = "admin-secret";

#[derive(Default)]
struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
}

impl RecordingNotifier {
    fn kinds(&self) -> Vec<NotificationKind> {
        self.sent.lock().unwrap().iter().map(|n| n.kind).collect()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &Notification) -> Result<(), NotifyError> {
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

struct BrokenNotifier;

#[async_trait]
impl Notifier for BrokenNotifier {
    async fn notify(&self, _notification: &Notification) -> Result<(), NotifyError> {
        Err(NotifyError::Unavailable("smtp down".to_string()))
    }
}

#[derive(Default)]
struct BrokenBlobStore {
    attempts: Mutex<Vec<String>>,
}

#[async_trait]
impl BlobStore for BrokenBlobStore {
    async fn delete(&self, key: &str) -> Result<(), BlobError> {
        self.attempts.lock().unwrap().push(key.to_string());
        Err(BlobError::Io(std::io::Error::other("bucket unreachable")))
    }
}

struct Fixture {
    engine: Engine,
    db: DatabaseConnection,
    admin: Principal,
    accountant: Principal,
    alice: Principal,
    bob: Principal,
    company: Company,
}

async fn connect() -> DatabaseConnection {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    db
}

/// A fresh database file behind a pool of several connections, so that
/// concurrent transactions really overlap.
async fn connect_file() -> (DatabaseConnection, PathBuf) {
    let root = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../target/test_dbs");
    std::fs::create_dir_all(&root).unwrap();
    let path = root.join(format!("engine_{}.db", Uuid::new_v4()));

    let mut options = ConnectOptions::new(format!("sqlite:{}?mode=rwc", path.display()));
    options.max_connections(4);
    let db = Database::connect(options).await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    (db, path)
}

fn remove_db_files(path: &Path) {
    for suffix in ["", "-wal", "-shm"] {
        let _ = std::fs::remove_file(format!("{}{suffix}", path.display()));
    }
}

async fn fixture() -> Fixture {
    fixture_with(Engine::builder()).await
}

async fn fixture_with(builder: engine::EngineBuilder) -> Fixture {
    fixture_on(connect().await, builder).await
}

async fn fixture_on(db: DatabaseConnection, builder: engine::EngineBuilder) -> Fixture {
    let engine = builder
        .database(db.clone())
        .password_policy(PasswordPolicy::insecure_fast())
        .build()
        .await
        .unwrap();

    let principal = |user: engine::User| Principal::new(user.id, user.username, user.role);
    let admin = principal(
        engine
            .create_user("admin", ADMIN_PASSWORD, Role::Admin)
            .await
            .unwrap(),
    );
    let accountant = principal(
        engine
            .create_user("ksiegowa", "accountant-secret", Role::Accountant)
            .await
            .unwrap(),
    );
    let alice = principal(
        engine
            .create_user("alice", "alice-secret", Role::User)
            .await
            .unwrap(),
    );
    let bob = principal(
        engine
            .create_user("bob", "bob-secret", Role::User)
            .await
            .unwrap(),
    );

    let company = engine
        .create_company(&admin, "Acme Sp. z o.o.", Some("5260000000"))
        .await
        .unwrap();
    engine
        .set_user_companies(&admin, alice.id, vec![company.id])
        .await
        .unwrap();
    engine
        .set_user_companies(&admin, bob.id, vec![company.id])
        .await
        .unwrap();

    Fixture {
        engine,
        db,
        admin,
        accountant,
        alice,
        bob,
        company,
    }
}

fn pln(raw: &str) -> MoneyCents {
    raw.parse().unwrap()
}

async fn balance(fx: &Fixture, principal: &Principal) -> MoneyCents {
    fx.engine.me(principal).await.unwrap().balance
}

async fn invoice_status(fx: &Fixture, id: Uuid) -> InvoiceStatus {
    fx.engine.invoice(&fx.accountant, id).await.unwrap().status
}

async fn assert_ledger_consistent(fx: &Fixture, principal: &Principal) {
    let report = fx
        .engine
        .verify_ledger(&fx.accountant, principal.id)
        .await
        .unwrap();
    assert!(report.consistent, "ledger problems: {:?}", report.problems);
    assert_eq!(report.replayed_balance, report.stored_balance);
}

async fn file_request(fx: &Fixture, amount: &str) -> Uuid {
    fx.engine
        .create_budget_request(
            &fx.alice,
            NewBudgetRequestCmd::new(fx.company.id, pln(amount), "Delegacja Kraków, hotel"),
        )
        .await
        .unwrap()
        .id
}

fn invoice_cmd(fx: &Fixture, number: &str, amount: &str) -> NewInvoiceCmd {
    NewInvoiceCmd::new(
        fx.company.id,
        number,
        pln(amount),
        format!("scans/{number}.pdf"),
    )
}

#[tokio::test]
async fn concurrent_approvals_create_exactly_one_advance() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "500").await;

    let (first, second) = tokio::join!(
        fx.engine
            .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None),
        fx.engine
            .review_budget_request(&fx.admin, request_id, ReviewAction::Approve, None),
    );

    let outcomes = [first, second];
    let approved = outcomes.iter().filter(|res| res.is_ok()).count();
    let conflicts = outcomes
        .iter()
        .filter(|res| matches!(res, Err(EngineError::Conflict(_))))
        .count();
    assert_eq!(approved, 1);
    assert_eq!(conflicts, 1);

    let advances = fx
        .engine
        .list_advances(&fx.accountant, Default::default())
        .await
        .unwrap();
    assert_eq!(advances.len(), 1);
    assert_eq!(advances[0].source_id, Some(request_id));
    assert_eq!(advances[0].status, AdvanceStatus::Pending);
}

fn one_winner<T: std::fmt::Debug>(outcomes: [Result<T, EngineError>; 2]) -> T {
    let [first, second] = outcomes;
    match (first, second) {
        (Ok(won), Err(EngineError::Conflict(_))) | (Err(EngineError::Conflict(_)), Ok(won)) => won,
        other => panic!("expected one success and one conflict, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn racing_reviewers_on_a_pooled_database_get_conflicts() {
    let (db, path) = connect_file().await;
    let fx = fixture_on(db, Engine::builder()).await;

    for round in 1..=5 {
        let request_id = file_request(&fx, "100").await;
        let (first, second) = tokio::join!(
            fx.engine.review_budget_request(
                &fx.accountant,
                request_id,
                ReviewAction::Approve,
                None
            ),
            fx.engine
                .review_budget_request(&fx.admin, request_id, ReviewAction::Approve, None),
        );
        let review = one_winner([first, second]);
        let advance = review.advance.unwrap();

        let advances = fx
            .engine
            .list_advances(&fx.accountant, Default::default())
            .await
            .unwrap();
        assert_eq!(advances.len(), round);

        let (first, second) = tokio::join!(
            fx.engine
                .transfer_advance(&fx.accountant, advance.id, TransferInfo::default()),
            fx.engine
                .transfer_advance(&fx.admin, advance.id, TransferInfo::default()),
        );
        let transferred = one_winner([first, second]);
        assert_eq!(transferred.status, AdvanceStatus::Transferred);
        assert_eq!(balance(&fx, &fx.alice).await, MoneyCents::new(100_00 * round as i64));
    }
    assert_ledger_consistent(&fx, &fx.alice).await;

    let invoice = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/RACE/1", "40"))
        .await
        .unwrap();
    let request = fx
        .engine
        .create_deletion_request(&fx.alice, invoice.id, "Faktura wystawiona na zły NIP")
        .await
        .unwrap();
    let (first, second) = tokio::join!(
        fx.engine.review_deletion_request(
            &fx.admin,
            request.id,
            ReviewAction::Approve,
            None,
            ADMIN_PASSWORD
        ),
        fx.engine.review_deletion_request(
            &fx.admin,
            request.id,
            ReviewAction::Approve,
            None,
            ADMIN_PASSWORD
        ),
    );
    let reviewed = one_winner([first, second]);
    assert_eq!(reviewed.status, DeletionRequestStatus::Approved);
    assert!(matches!(
        fx.engine.invoice(&fx.admin, invoice.id).await,
        Err(EngineError::NotFound(_))
    ));

    drop(fx);
    remove_db_files(&path);
}

#[tokio::test]
async fn ledger_stays_consistent_through_the_full_cycle() {
    let fx = fixture().await;

    fx.engine
        .top_up(&fx.accountant, fx.alice.id, pln("100"), Some("start"))
        .await
        .unwrap();
    assert_ledger_consistent(&fx, &fx.alice).await;

    let request_id = file_request(&fx, "500").await;
    let request = fx.engine.budget_request(&fx.alice, request_id).await.unwrap();
    assert_eq!(request.current_balance_at_request, pln("100"));

    // approval alone does not move money
    fx.engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("100"));

    fx.engine
        .confirm_budget_request_transfer(&fx.accountant, request_id, TransferInfo::number("PRZ/2026/001"))
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("600"));
    assert_ledger_consistent(&fx, &fx.alice).await;

    let hotel = fx
        .engine
        .create_invoice(
            &fx.alice,
            invoice_cmd(&fx, "FV/1/2026", "200").budget_request(request_id),
        )
        .await
        .unwrap();
    let taxi = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/2/2026", "50"))
        .await
        .unwrap();

    fx.engine
        .review_invoice(&fx.accountant, hotel.id, ReviewAction::Approve, None)
        .await
        .unwrap();
    fx.engine
        .review_invoice(&fx.accountant, taxi.id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("350"));
    assert_ledger_consistent(&fx, &fx.alice).await;

    // rejecting an accepted invoice refunds it
    fx.engine
        .review_invoice(
            &fx.accountant,
            taxi.id,
            ReviewAction::Reject,
            Some("Brak NIP nabywcy na fakturze"),
        )
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("400"));
    assert_ledger_consistent(&fx, &fx.alice).await;

    fx.engine.delete_invoice(&fx.admin, hotel.id).await.unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("600"));
    assert_ledger_consistent(&fx, &fx.alice).await;

    fx.engine
        .adjust_balance(&fx.admin, fx.alice.id, pln("-25.50"), "korekta salda")
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("574.50"));
    assert_ledger_consistent(&fx, &fx.alice).await;

    let kinds: Vec<LedgerKind> = fx
        .engine
        .ledger_history(&fx.alice, fx.alice.id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.transaction_type)
        .collect();
    assert_eq!(
        kinds,
        vec![
            LedgerKind::TopUp,
            LedgerKind::AdvanceCredit,
            LedgerKind::InvoiceDeduction,
            LedgerKind::InvoiceDeduction,
            LedgerKind::InvoiceRefund,
            LedgerKind::InvoiceDeleteRefund,
            LedgerKind::Adjustment,
        ]
    );
}

#[tokio::test]
async fn one_pending_request_per_company() {
    let fx = fixture().await;
    file_request(&fx, "300").await;

    let err = fx
        .engine
        .create_budget_request(
            &fx.alice,
            NewBudgetRequestCmd::new(fx.company.id, pln("100"), "Drugi wniosek, paliwo"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let other = fx
        .engine
        .create_company(&fx.admin, "Beta S.A.", None)
        .await
        .unwrap();
    fx.engine
        .set_user_companies(&fx.admin, fx.alice.id, vec![fx.company.id, other.id])
        .await
        .unwrap();
    fx.engine
        .create_budget_request(
            &fx.alice,
            NewBudgetRequestCmd::new(other.id, pln("100"), "Wniosek dla drugiej firmy"),
        )
        .await
        .unwrap();

    // a different user is not blocked by alice's pending request
    fx.engine
        .create_budget_request(
            &fx.bob,
            NewBudgetRequestCmd::new(fx.company.id, pln("80"), "Materiały biurowe"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn settling_an_advance_closes_only_accepted_invoices() {
    let fx = fixture().await;
    let advance = fx
        .engine
        .create_manual_advance(
            &fx.accountant,
            NewAdvanceCmd {
                user_id: fx.alice.id,
                company_id: fx.company.id,
                amount: pln("1000"),
                description: "Zaliczka na targi".to_string(),
            },
        )
        .await
        .unwrap();

    let err = fx
        .engine
        .settle_advance(&fx.accountant, advance.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    fx.engine
        .transfer_advance(&fx.accountant, advance.id, TransferInfo::default())
        .await
        .unwrap();

    let mut ids = Vec::new();
    for number in ["FV/10", "FV/11", "FV/12"] {
        let invoice = fx
            .engine
            .create_invoice(
                &fx.alice,
                invoice_cmd(&fx, number, "100").advance(advance.id),
            )
            .await
            .unwrap();
        ids.push(invoice.id);
    }
    let (accepted, rejected, pending) = (ids[0], ids[1], ids[2]);
    fx.engine
        .review_invoice(&fx.accountant, accepted, ReviewAction::Approve, None)
        .await
        .unwrap();
    fx.engine
        .review_invoice(
            &fx.accountant,
            rejected,
            ReviewAction::Reject,
            Some("Faktura nieczytelna, prosimy o skan"),
        )
        .await
        .unwrap();

    let outcome = fx
        .engine
        .settle_advance(&fx.accountant, advance.id)
        .await
        .unwrap();
    assert_eq!(outcome.settled_invoice_ids, vec![accepted]);

    assert_eq!(invoice_status(&fx, accepted).await, InvoiceStatus::Settled);
    assert_eq!(invoice_status(&fx, rejected).await, InvoiceStatus::Rejected);
    assert_eq!(invoice_status(&fx, pending).await, InvoiceStatus::Pending);

    let advance = fx.engine.advance(&fx.alice, advance.id).await.unwrap();
    assert_eq!(advance.status, AdvanceStatus::Settled);
    assert_eq!(advance.settled_by, Some(fx.accountant.id));
}

#[tokio::test]
async fn settling_a_budget_request_closes_its_invoices_and_advance() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "400").await;
    let review = fx
        .engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    let advance_id = review.advance.unwrap().id;

    let err = fx
        .engine
        .settle_budget_request(&fx.accountant, request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    fx.engine
        .confirm_budget_request_transfer(&fx.accountant, request_id, TransferInfo::number("PRZ/77"))
        .await
        .unwrap();
    assert_eq!(
        fx.engine.advance(&fx.alice, advance_id).await.unwrap().status,
        AdvanceStatus::Transferred
    );

    let mut invoices = Vec::new();
    for number in ["FV/20", "FV/21", "FV/22"] {
        let invoice = fx
            .engine
            .create_invoice(
                &fx.alice,
                invoice_cmd(&fx, number, "100").budget_request(request_id),
            )
            .await
            .unwrap();
        invoices.push(invoice.id);
    }
    for id in &invoices[..2] {
        fx.engine
            .review_invoice(&fx.accountant, *id, ReviewAction::Approve, None)
            .await
            .unwrap();
    }
    fx.engine
        .mark_invoice_transferred(&fx.accountant, invoices[0])
        .await
        .unwrap();

    let mut settled = fx
        .engine
        .settle_budget_request(&fx.accountant, request_id)
        .await
        .unwrap()
        .settled_invoice_ids;
    settled.sort();
    let mut expected = invoices[..2].to_vec();
    expected.sort();
    assert_eq!(settled, expected);

    let request = fx.engine.budget_request(&fx.alice, request_id).await.unwrap();
    assert_eq!(request.status, BudgetRequestStatus::Settled);
    assert_eq!(
        fx.engine.advance(&fx.alice, advance_id).await.unwrap().status,
        AdvanceStatus::Settled
    );
    let left = fx
        .engine
        .list_invoices(
            &fx.accountant,
            InvoiceListFilter {
                status: Some(InvoiceStatus::Pending),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(left.len(), 1);
    assert_eq!(left[0].id, invoices[2]);

    // settled invoices are final
    let err = fx.engine.delete_invoice(&fx.admin, invoices[0]).await.unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}

#[tokio::test]
async fn short_rejection_reason_leaves_request_pending() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "120").await;

    for reason in [None, Some("za mało"), Some("   krótko   ")] {
        let err = fx
            .engine
            .review_budget_request(&fx.accountant, request_id, ReviewAction::Reject, reason)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::BadRequest(_)));
    }
    let request = fx.engine.budget_request(&fx.alice, request_id).await.unwrap();
    assert_eq!(request.status, BudgetRequestStatus::Pending);

    let review = fx
        .engine
        .review_budget_request(
            &fx.accountant,
            request_id,
            ReviewAction::Reject,
            Some("Brak budżetu w tym kwartale"),
        )
        .await
        .unwrap();
    assert_eq!(review.request.status, BudgetRequestStatus::Rejected);
    assert!(review.advance.is_none());
}

const LEDGER_OFFLINE: &str = "CREATE TRIGGER ledger_offline BEFORE INSERT ON saldo_transactions \
     BEGIN SELECT RAISE(ABORT, 'ledger offline'); END;";

#[tokio::test]
async fn failed_ledger_write_rolls_back_the_transfer() {
    let fx = fixture().await;
    fx.engine
        .top_up(&fx.accountant, fx.alice.id, pln("100"), None)
        .await
        .unwrap();
    let advance = fx
        .engine
        .create_manual_advance(
            &fx.accountant,
            NewAdvanceCmd {
                user_id: fx.alice.id,
                company_id: fx.company.id,
                amount: pln("50"),
                description: "Zaliczka na paliwo".to_string(),
            },
        )
        .await
        .unwrap();

    fx.db.execute_unprepared(LEDGER_OFFLINE).await.unwrap();

    let err = fx
        .engine
        .transfer_advance(&fx.accountant, advance.id, TransferInfo::default())
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Database(_)));
    assert_eq!(balance(&fx, &fx.alice).await, pln("100"));
    let advance = fx.engine.advance(&fx.alice, advance.id).await.unwrap();
    assert_eq!(advance.status, AdvanceStatus::Pending);
    assert!(advance.transfer_confirmed_by.is_none());

    fx.db
        .execute_unprepared("DROP TRIGGER ledger_offline;")
        .await
        .unwrap();
    fx.engine
        .transfer_advance(&fx.accountant, advance.id, TransferInfo::default())
        .await
        .unwrap();
    assert_eq!(balance(&fx, &fx.alice).await, pln("150"));
    assert_ledger_consistent(&fx, &fx.alice).await;
}

#[tokio::test]
async fn failed_ledger_write_rolls_back_the_transfer_confirmation() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "250").await;
    let advance_id = fx
        .engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap()
        .advance
        .unwrap()
        .id;

    fx.db.execute_unprepared(LEDGER_OFFLINE).await.unwrap();

    let err = fx
        .engine
        .confirm_budget_request_transfer(&fx.accountant, request_id, TransferInfo::number("PRZ/500"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Database(_)));

    assert_eq!(balance(&fx, &fx.alice).await, MoneyCents::ZERO);
    let request = fx.engine.budget_request(&fx.alice, request_id).await.unwrap();
    assert_eq!(request.status, BudgetRequestStatus::Approved);
    assert!(request.transfer_number.is_none());
    let advance = fx.engine.advance(&fx.alice, advance_id).await.unwrap();
    assert_eq!(advance.status, AdvanceStatus::Pending);
}

#[tokio::test]
async fn deletion_request_is_reviewed_once() {
    let fx = fixture().await;
    let invoice = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/30", "80"))
        .await
        .unwrap();
    fx.engine
        .review_invoice(&fx.accountant, invoice.id, ReviewAction::Approve, None)
        .await
        .unwrap();

    let short = fx
        .engine
        .create_deletion_request(&fx.alice, invoice.id, "dubel")
        .await
        .unwrap_err();
    assert!(matches!(short, EngineError::BadRequest(_)));

    let request = fx
        .engine
        .create_deletion_request(&fx.alice, invoice.id, "Faktura wgrana dwa razy")
        .await
        .unwrap();
    let dup = fx
        .engine
        .create_deletion_request(&fx.alice, invoice.id, "Faktura wgrana dwa razy")
        .await
        .unwrap_err();
    assert!(matches!(dup, EngineError::Conflict(_)));

    let wrong = fx
        .engine
        .review_deletion_request(&fx.admin, request.id, ReviewAction::Approve, None, "guess")
        .await
        .unwrap_err();
    assert!(matches!(wrong, EngineError::Unauthorized(_)));

    let reviewed = fx
        .engine
        .review_deletion_request(
            &fx.admin,
            request.id,
            ReviewAction::Approve,
            None,
            ADMIN_PASSWORD,
        )
        .await
        .unwrap();
    assert_eq!(reviewed.status, DeletionRequestStatus::Approved);
    assert_eq!(reviewed.invoice_id, invoice.id);

    let gone = fx.engine.invoice(&fx.admin, invoice.id).await.unwrap_err();
    assert!(matches!(gone, EngineError::NotFound(_)));
    assert_eq!(balance(&fx, &fx.alice).await, MoneyCents::ZERO);

    let again = fx
        .engine
        .review_deletion_request(
            &fx.admin,
            request.id,
            ReviewAction::Approve,
            None,
            ADMIN_PASSWORD,
        )
        .await
        .unwrap_err();
    assert!(matches!(again, EngineError::Conflict(_)));
    assert_ledger_consistent(&fx, &fx.alice).await;
}

#[tokio::test]
async fn deleting_an_invoice_closes_its_pending_deletion_request() {
    let fx = fixture().await;
    let invoice = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/31", "15"))
        .await
        .unwrap();
    let request = fx
        .engine
        .create_deletion_request(&fx.alice, invoice.id, "Pomyłka przy wgrywaniu")
        .await
        .unwrap();

    fx.engine.delete_invoice(&fx.admin, invoice.id).await.unwrap();

    let request = fx
        .engine
        .deletion_request(&fx.alice, request.id)
        .await
        .unwrap();
    assert_eq!(request.status, DeletionRequestStatus::Approved);
    assert_eq!(request.reviewed_by, Some(fx.admin.id));
}

#[tokio::test]
async fn notifications_follow_commits_and_failures_are_swallowed() {
    let notifier = Arc::new(RecordingNotifier::default());
    let fx = fixture_with(Engine::builder().notifier(notifier.clone())).await;
    let request_id = file_request(&fx, "60").await;
    fx.engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();

    // one per reviewer for the new request, then the approval for alice
    assert_eq!(
        notifier.kinds(),
        vec![
            NotificationKind::BudgetRequestCreated,
            NotificationKind::BudgetRequestCreated,
            NotificationKind::BudgetRequestApproved,
        ]
    );
    let failed = fx
        .engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await;
    assert!(failed.is_err());
    assert_eq!(notifier.kinds().len(), 3);

    let fx = fixture_with(Engine::builder().notifier(Arc::new(BrokenNotifier))).await;
    let request_id = file_request(&fx, "60").await;
    let review = fx
        .engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(review.request.status, BudgetRequestStatus::Approved);
}

#[tokio::test]
async fn blob_store_failure_does_not_undo_deletion() {
    let blobs = Arc::new(BrokenBlobStore::default());
    let fx = fixture_with(Engine::builder().blob_store(blobs.clone())).await;
    let invoice = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/40", "10"))
        .await
        .unwrap();

    fx.engine.delete_invoice(&fx.admin, invoice.id).await.unwrap();

    assert_eq!(
        *blobs.attempts.lock().unwrap(),
        vec!["scans/FV/40.pdf".to_string()]
    );
    let err = fx.engine.invoice(&fx.admin, invoice.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn bulk_delete_requires_password_and_filter() {
    let fx = fixture().await;
    let rejected = file_request(&fx, "10").await;
    fx.engine
        .review_budget_request(
            &fx.accountant,
            rejected,
            ReviewAction::Reject,
            Some("Wniosek zdublowany z innym"),
        )
        .await
        .unwrap();
    let pending = file_request(&fx, "20").await;

    let filter = BudgetRequestBulkFilter {
        statuses: Some(vec![BudgetRequestStatus::Rejected]),
        ..Default::default()
    };
    let err = fx
        .engine
        .bulk_delete_budget_requests(&fx.admin, filter.clone(), "nope")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let err = fx
        .engine
        .bulk_delete_budget_requests(&fx.admin, Default::default(), ADMIN_PASSWORD)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));

    let err = fx
        .engine
        .bulk_delete_budget_requests(&fx.accountant, filter.clone(), "accountant-secret")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let deleted = fx
        .engine
        .bulk_delete_budget_requests(&fx.admin, filter, ADMIN_PASSWORD)
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(fx.engine.budget_request(&fx.alice, rejected).await.is_err());
    assert!(fx.engine.budget_request(&fx.alice, pending).await.is_ok());
}

async fn backdate_request(fx: &Fixture, request_id: Uuid, days: i64) {
    fx.db
        .execute(Statement::from_sql_and_values(
            fx.db.get_database_backend(),
            "UPDATE budget_requests SET created_at = ? WHERE id = ?",
            vec![
                (Utc::now() - Duration::days(days)).into(),
                request_id.to_string().into(),
            ],
        ))
        .await
        .unwrap();
}

async fn reject_request(fx: &Fixture, request_id: Uuid) {
    fx.engine
        .review_budget_request(
            &fx.accountant,
            request_id,
            ReviewAction::Reject,
            Some("Brak uzasadnienia kosztów"),
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn bulk_delete_filters_combine() {
    let fx = fixture().await;
    let alice_approved = file_request(&fx, "10").await;
    fx.engine
        .review_budget_request(&fx.accountant, alice_approved, ReviewAction::Approve, None)
        .await
        .unwrap();
    let alice_rejected = file_request(&fx, "20").await;
    reject_request(&fx, alice_rejected).await;
    let alice_pending = file_request(&fx, "30").await;
    let bob_rejected = fx
        .engine
        .create_budget_request(
            &fx.bob,
            NewBudgetRequestCmd::new(fx.company.id, pln("40"), "Szkolenie BHP dla zespołu"),
        )
        .await
        .unwrap()
        .id;
    reject_request(&fx, bob_rejected).await;

    // nothing filed just now is older than a day
    let deleted = fx
        .engine
        .bulk_delete_budget_requests(
            &fx.admin,
            BudgetRequestBulkFilter {
                older_than_days: Some(1),
                ..Default::default()
            },
            ADMIN_PASSWORD,
        )
        .await
        .unwrap();
    assert_eq!(deleted, 0);

    backdate_request(&fx, alice_approved, 40).await;
    backdate_request(&fx, alice_rejected, 40).await;
    backdate_request(&fx, bob_rejected, 40).await;

    let deleted = fx
        .engine
        .bulk_delete_budget_requests(
            &fx.admin,
            BudgetRequestBulkFilter {
                statuses: Some(vec![BudgetRequestStatus::Rejected]),
                user_id: Some(fx.alice.id),
                older_than_days: Some(30),
                ..Default::default()
            },
            ADMIN_PASSWORD,
        )
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(fx.engine.budget_request(&fx.alice, alice_rejected).await.is_err());

    let deleted = fx
        .engine
        .bulk_delete_budget_requests(
            &fx.admin,
            BudgetRequestBulkFilter {
                user_id: Some(fx.bob.id),
                created_from: Some(Utc::now() - Duration::days(45)),
                created_to: Some(Utc::now() - Duration::days(35)),
                ..Default::default()
            },
            ADMIN_PASSWORD,
        )
        .await
        .unwrap();
    assert_eq!(deleted, 1);
    assert!(fx.engine.budget_request(&fx.bob, bob_rejected).await.is_err());

    let left: Vec<Uuid> = fx
        .engine
        .list_budget_requests(&fx.accountant, Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|request| request.id)
        .collect();
    assert_eq!(left.len(), 2);
    assert!(left.contains(&alice_approved));
    assert!(left.contains(&alice_pending));
}

#[tokio::test]
async fn bulk_delete_rejects_an_unrepresentable_age() {
    let fx = fixture().await;
    file_request(&fx, "10").await;

    let err = fx
        .engine
        .bulk_delete_budget_requests(
            &fx.admin,
            BudgetRequestBulkFilter {
                older_than_days: Some(u32::MAX),
                ..Default::default()
            },
            ADMIN_PASSWORD,
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));
    let requests = fx
        .engine
        .list_budget_requests(&fx.accountant, Default::default())
        .await
        .unwrap();
    assert_eq!(requests.len(), 1);
}

#[tokio::test]
async fn deleting_a_request_unlinks_its_invoices() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "300").await;
    let review = fx
        .engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    let advance_id = review.advance.unwrap().id;

    let mut cmd = invoice_cmd(&fx, "FV/LINK/1", "120");
    cmd.budget_request_id = Some(request_id);
    cmd.advance_id = Some(advance_id);
    let invoice = fx.engine.create_invoice(&fx.alice, cmd).await.unwrap();

    let deleted = fx
        .engine
        .bulk_delete_budget_requests(
            &fx.admin,
            BudgetRequestBulkFilter {
                user_id: Some(fx.alice.id),
                statuses: Some(vec![BudgetRequestStatus::Approved]),
                ..Default::default()
            },
            ADMIN_PASSWORD,
        )
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let invoice = fx.engine.invoice(&fx.alice, invoice.id).await.unwrap();
    assert_eq!(invoice.budget_request_id, None);
    assert_eq!(invoice.advance_id, Some(advance_id));
}

#[tokio::test]
async fn only_the_owner_cancels_a_pending_request() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "90").await;

    let err = fx
        .engine
        .cancel_budget_request(&fx.bob, request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));

    fx.engine
        .review_budget_request(&fx.accountant, request_id, ReviewAction::Approve, None)
        .await
        .unwrap();
    let err = fx
        .engine
        .cancel_budget_request(&fx.alice, request_id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let fresh = fx
        .engine
        .create_budget_request(
            &fx.alice,
            NewBudgetRequestCmd::new(fx.company.id, pln("30"), "Bilety kolejowe"),
        )
        .await
        .unwrap();
    fx.engine
        .cancel_budget_request(&fx.alice, fresh.id)
        .await
        .unwrap();
    let err = fx.engine.budget_request(&fx.alice, fresh.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
}

#[tokio::test]
async fn roles_gate_every_transition() {
    let fx = fixture().await;
    let request_id = file_request(&fx, "70").await;

    let err = fx
        .engine
        .review_budget_request(&fx.bob, request_id, ReviewAction::Approve, None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = fx
        .engine
        .top_up(&fx.alice, fx.alice.id, pln("1000"), None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let err = fx
        .engine
        .adjust_balance(&fx.accountant, fx.alice.id, pln("5"), "korekta ręczna")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    let invoice = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/50", "5"))
        .await
        .unwrap();
    let err = fx
        .engine
        .delete_invoice(&fx.accountant, invoice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    // other users' entities are hidden, other users' ledgers are refused
    let err = fx.engine.invoice(&fx.bob, invoice.id).await.unwrap_err();
    assert!(matches!(err, EngineError::NotFound(_)));
    let err = fx
        .engine
        .ledger_history(&fx.bob, fx.alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
    let err = fx
        .engine
        .verify_ledger(&fx.alice, fx.alice.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));
}

#[tokio::test]
async fn company_permissions_and_activity_are_enforced() {
    let fx = fixture().await;
    let other = fx
        .engine
        .create_company(&fx.admin, "Gamma", None)
        .await
        .unwrap();

    let err = fx
        .engine
        .create_budget_request(
            &fx.alice,
            NewBudgetRequestCmd::new(other.id, pln("10"), "Bez uprawnień do firmy"),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Forbidden(_)));

    fx.engine
        .set_company_active(&fx.admin, fx.company.id, false)
        .await
        .unwrap();
    let err = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/60", "10"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));

    let err = fx
        .engine
        .create_company(&fx.admin, "GAMMA", None)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    let visible = fx.engine.list_companies(&fx.alice).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, fx.company.id);
}

#[tokio::test]
async fn invoice_rules_on_submission() {
    let fx = fixture().await;
    let original = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/70", "100"))
        .await
        .unwrap();

    let err = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/70", "100"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));

    // bob may reuse the number, it is unique per user and company only
    fx.engine
        .create_invoice(&fx.bob, invoice_cmd(&fx, "FV/70", "100"))
        .await
        .unwrap();

    let err = fx
        .engine
        .create_invoice(
            &fx.bob,
            invoice_cmd(&fx, "KOR/70", "20").correction_of(original.id),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));

    let correction = fx
        .engine
        .create_invoice(
            &fx.alice,
            invoice_cmd(&fx, "KOR/70", "20").correction_of(original.id),
        )
        .await
        .unwrap();
    assert_eq!(correction.original_invoice_id, Some(original.id));

    let err = fx
        .engine
        .create_invoice(&fx.alice, invoice_cmd(&fx, "FV/71", "0"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::BadRequest(_)));

    fx.engine
        .start_invoice_review(&fx.accountant, original.id)
        .await
        .unwrap();
    let err = fx
        .engine
        .start_invoice_review(&fx.admin, original.id)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
    let accepted = fx
        .engine
        .review_invoice(&fx.admin, original.id, ReviewAction::Approve, None)
        .await
        .unwrap();
    assert_eq!(accepted.status, InvoiceStatus::Accepted);
}

#[tokio::test]
async fn authentication_checks_the_password_hash() {
    let fx = fixture().await;
    let principal = fx.engine.authenticate("alice", "alice-secret").await.unwrap();
    assert_eq!(principal, fx.alice);

    let err = fx
        .engine
        .authenticate("alice", "wrong")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));
    let err = fx
        .engine
        .authenticate("nobody", "alice-secret")
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Unauthorized(_)));

    let err = fx
        .engine
        .create_user("alice", "another", Role::User)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Conflict(_)));
}
