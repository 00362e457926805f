//! Integration tests for the ledger write pipeline.
//!
//! Tests: LedgerService -> BalanceEngine -> InMemoryLedgerStore
//!
//! Verifies:
//! - The create / update / delete balance walkthrough
//! - Concurrent writes against one customer never lose an update
//! - Rejected writes leave entry and customer untouched
//! - Writes that would overflow the balance are refused, not panicked on
//! - Storage conflicts are retried; stale client versions are not

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use proptest::prelude::*;
    use rust_decimal::Decimal;

    use backoffice_core::{
        Amount, CustomerId, ExpectedVersion, LedgerEntryId, UserId, Versioned, WorksiteId,
    };
    use backoffice_directory::{DirectoryRecord, Personnel, PersonnelDraft, Worksite, WorksiteDraft};
    use backoffice_ledger::{
        BalanceStatus, CustomerDraft, EntryDetails, EntryFilter, InvoiceDetails, LedgerEntryDraft,
        PaymentDetails,
    };

    use crate::error::LedgerServiceError;
    use crate::ledger_service::LedgerService;
    use crate::records::DirectoryStores;
    use crate::store::{InMemoryLedgerStore, LedgerStore};

    type Service = LedgerService<InMemoryLedgerStore>;

    fn setup() -> Service {
        LedgerService::new(InMemoryLedgerStore::new(), DirectoryStores::in_memory())
    }

    fn amt(v: i64) -> Option<Amount> {
        Some(Amount::new(Decimal::from(v)).unwrap())
    }

    fn invoice(customer: CustomerId, debt: Option<Amount>, receivable: Option<Amount>) -> LedgerEntryDraft {
        LedgerEntryDraft {
            customer,
            details: EntryDetails::Invoice(InvoiceDetails {
                material: Some("Hazır beton C30".to_string()),
                ..InvoiceDetails::default()
            }),
            debt,
            receivable,
            date: Utc::now(),
            worksite: None,
            group: None,
            company: None,
            description: None,
        }
    }

    async fn new_customer(svc: &Service) -> CustomerId {
        svc.create_customer(
            CustomerDraft { name: "Anadolu Yapı".to_string() },
            Some(UserId::new()),
        )
        .await
        .unwrap()
        .id_typed()
    }

    #[tokio::test]
    async fn balance_walkthrough_create_update_delete() {
        let svc = setup();
        let cid = new_customer(&svc).await;

        // Create: debt=100, receivable=30 -> 70 'B'
        let created = svc.create_entry(invoice(cid, amt(100), amt(30)), None).await.unwrap();
        assert_eq!(created.customer.balance(), Decimal::from(70));
        assert_eq!(created.customer.balance_status(), BalanceStatus::Borrower);

        // Update the same entry to debt=40, receivable=10 -> 30 'B'
        let updated = svc
            .update_entry(created.entry.id, invoice(cid, amt(40), amt(10)), ExpectedVersion::Any)
            .await
            .unwrap();
        assert_eq!(updated.customer.balance(), Decimal::from(30));
        assert_eq!(updated.customer.balance_status(), BalanceStatus::Borrower);
        assert_eq!(updated.entry.version, 2);

        // Delete an entry with debt=50 from a customer at 30 -> -20 'A'
        let fifty = svc.create_entry(invoice(cid, amt(50), amt(0)), None).await.unwrap();
        assert_eq!(fifty.customer.balance(), Decimal::from(80));
        svc.update_entry(
            created.entry.id,
            invoice(cid, None, amt(20)),
            ExpectedVersion::Exact(2),
        )
        .await
        .unwrap();
        assert_eq!(svc.get_customer(cid).await.unwrap().balance(), Decimal::from(30));

        let after = svc.delete_entry(fifty.entry.id, ExpectedVersion::Any).await.unwrap();
        assert_eq!(after.balance(), Decimal::from(-20));
        assert_eq!(after.balance_status(), BalanceStatus::Creditor);

        assert!(svc.audit_customer(cid).await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_creates_never_lose_an_update() {
        let svc = Arc::new(setup());
        let cid = new_customer(&svc).await;

        let a = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.create_entry(invoice(cid, amt(10), None), None).await })
        };
        let b = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.create_entry(invoice(cid, amt(20), None), None).await })
        };
        a.await.unwrap().unwrap();
        b.await.unwrap().unwrap();

        let customer = svc.get_customer(cid).await.unwrap();
        assert_eq!(customer.balance(), Decimal::from(30));
        assert_eq!(customer.balance_status(), BalanceStatus::Borrower);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn many_concurrent_writers_sum_exactly() {
        let svc = Arc::new(setup());
        let cid = new_customer(&svc).await;

        let handles: Vec<_> = (1..=25)
            .map(|i| {
                let svc = Arc::clone(&svc);
                tokio::spawn(async move {
                    svc.create_entry(invoice(cid, amt(i), amt(1)), None).await
                })
            })
            .collect();
        for h in handles {
            h.await.unwrap().unwrap();
        }

        // sum(1..=25) - 25
        let customer = svc.get_customer(cid).await.unwrap();
        assert_eq!(customer.balance(), Decimal::from(300));
    }

    #[tokio::test]
    async fn entry_for_missing_customer_is_not_found_and_writes_nothing() {
        let svc = setup();
        let ghost = CustomerId::new();

        let err = svc.create_entry(invoice(ghost, amt(10), None), None).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::NotFound(_)));
        assert!(svc.list_entries(&EntryFilter::default()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn updating_missing_entry_is_not_found() {
        let svc = setup();
        let cid = new_customer(&svc).await;

        let err = svc
            .update_entry(LedgerEntryId::new(), invoice(cid, amt(1), None), ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerServiceError::NotFound(_)));
        assert_eq!(svc.get_customer(cid).await.unwrap().balance(), Decimal::ZERO);
    }

    #[tokio::test]
    async fn entry_without_amounts_is_rejected_before_the_engine() {
        let svc = setup();
        let cid = new_customer(&svc).await;

        let err = svc.create_entry(invoice(cid, None, None), None).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::InvalidAmount(_)));
        assert_eq!(svc.get_customer(cid).await.unwrap().balance(), Decimal::ZERO);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn balance_overflow_is_rejected_without_side_effects() {
        let svc = Arc::new(setup());
        let cid = new_customer(&svc).await;
        let max = Some(Amount::new(Decimal::MAX).unwrap());

        svc.create_entry(invoice(cid, max, None), None).await.unwrap();
        let credit = svc.create_entry(invoice(cid, None, amt(1)), None).await.unwrap();
        let ceiling = Decimal::MAX - Decimal::ONE;
        assert_eq!(credit.customer.balance(), ceiling);

        // Spawned so a panic in the write path shows up as a JoinError.
        let create = {
            let svc = Arc::clone(&svc);
            tokio::spawn(async move { svc.create_entry(invoice(cid, amt(2), None), None).await })
        };
        let err = create.await.expect("write path panicked").unwrap_err();
        assert!(matches!(err, LedgerServiceError::InvalidAmount(_)));

        // Removing the old -1 succeeds inside the transaction; adding +1 then
        // overflows and the staged removal must be discarded with it.
        let err = svc
            .update_entry(credit.entry.id, invoice(cid, amt(1), None), ExpectedVersion::Any)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerServiceError::InvalidAmount(_)));

        let customer = svc.get_customer(cid).await.unwrap();
        assert_eq!(customer.balance(), ceiling);
        assert_eq!(customer.balance_status(), BalanceStatus::Borrower);
        assert_eq!(customer.version(), credit.customer.version());
        assert_eq!(svc.get_entry(credit.entry.id).await.unwrap(), credit.entry);
        assert_eq!(
            svc.list_entries(&EntryFilter::for_customer(cid)).await.unwrap().len(),
            2
        );
        assert!(svc.audit_customer(cid).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn stale_expected_version_is_rejected_without_side_effects() {
        let svc = setup();
        let cid = new_customer(&svc).await;
        let w = svc.create_entry(invoice(cid, amt(100), None), None).await.unwrap();

        let err = svc
            .update_entry(w.entry.id, invoice(cid, amt(5), None), ExpectedVersion::Exact(7))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerServiceError::VersionMismatch(_)));

        let err = svc
            .delete_entry(w.entry.id, ExpectedVersion::Exact(2))
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerServiceError::VersionMismatch(_)));

        assert_eq!(svc.get_entry(w.entry.id).await.unwrap(), w.entry);
        assert_eq!(svc.get_customer(cid).await.unwrap().balance(), Decimal::from(100));
    }

    #[tokio::test]
    async fn storage_conflicts_are_retried_then_surface() {
        let svc = setup().with_max_retries(2);
        let cid = new_customer(&svc).await;

        svc.store().inject_commit_conflicts(2);
        let w = svc.create_entry(invoice(cid, amt(10), None), None).await.unwrap();
        assert_eq!(w.customer.balance(), Decimal::from(10));

        svc.store().inject_commit_conflicts(3);
        let err = svc.create_entry(invoice(cid, amt(10), None), None).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::ConcurrentModification(_)));

        // the failed write left nothing behind
        assert_eq!(svc.get_customer(cid).await.unwrap().balance(), Decimal::from(10));
        assert_eq!(
            svc.list_entries(&EntryFilter::for_customer(cid)).await.unwrap().len(),
            1
        );
    }

    #[tokio::test]
    async fn moving_entry_between_customers_keeps_both_balances_exact() {
        let svc = setup();
        let a = new_customer(&svc).await;
        let b = new_customer(&svc).await;

        let w = svc.create_entry(invoice(a, amt(40), amt(15)), None).await.unwrap();
        let moved = svc
            .update_entry(w.entry.id, invoice(b, amt(40), amt(15)), ExpectedVersion::Exact(1))
            .await
            .unwrap();

        assert_eq!(moved.customer.id_typed(), b);
        assert_eq!(svc.get_customer(a).await.unwrap().balance(), Decimal::ZERO);
        assert_eq!(svc.get_customer(b).await.unwrap().balance(), Decimal::from(25));
        assert!(svc.audit_all().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn referenced_customer_cannot_be_deleted() {
        let svc = setup();
        let cid = new_customer(&svc).await;
        let w = svc.create_entry(invoice(cid, amt(1), None), None).await.unwrap();

        let err = svc.delete_customer(cid).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::Conflict(_)));

        svc.delete_entry(w.entry.id, ExpectedVersion::Any).await.unwrap();
        svc.delete_customer(cid).await.unwrap();
        assert!(matches!(
            svc.get_customer(cid).await,
            Err(LedgerServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn unknown_worksite_reference_is_rejected() {
        let svc = setup();
        let cid = new_customer(&svc).await;

        let mut draft = invoice(cid, amt(5), None);
        draft.worksite = Some(WorksiteId::new());
        let err = svc.create_entry(draft.clone(), None).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::Validation(msg) if msg.contains("worksite")));

        let site = Worksite::create(
            WorksiteId::new(),
            WorksiteDraft { name: "Çankaya Konutları".to_string() },
            None,
            Utc::now(),
        )
        .unwrap();
        svc.directory().worksites.upsert(&site).await.unwrap();
        draft.worksite = Some(site.id);

        let w = svc.create_entry(draft, None).await.unwrap();
        let filter = EntryFilter {
            worksite: Some(site.id),
            ..EntryFilter::default()
        };
        assert!(svc.has_entries(&filter).await.unwrap());
        assert_eq!(svc.list_entries(&filter).await.unwrap(), vec![w.entry]);
    }

    #[tokio::test]
    async fn directory_records_in_use_cannot_be_deleted() {
        let svc = setup();
        let cid = new_customer(&svc).await;
        let site: Worksite = svc
            .create_record(WorksiteDraft { name: "Kartal Rezidans".to_string() }, None)
            .await
            .unwrap();

        let mut draft = invoice(cid, amt(12), None);
        draft.worksite = Some(site.id);
        let w = svc.create_entry(draft, None).await.unwrap();

        let err = svc.delete_record::<Worksite>(site.id).await.unwrap_err();
        assert!(matches!(err, LedgerServiceError::Conflict(_)));

        svc.delete_entry(w.entry.id, ExpectedVersion::Any).await.unwrap();
        svc.delete_record::<Worksite>(site.id).await.unwrap();
        assert!(matches!(
            svc.get_record::<Worksite>(site.id).await,
            Err(LedgerServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn personnel_must_point_at_an_existing_worksite() {
        let svc = setup();
        let draft = |worksite| PersonnelDraft {
            name: "Mehmet Kaya".to_string(),
            identity_number: "12345678901".to_string(),
            entry: None,
            exit: None,
            worksite,
        };

        let err = svc
            .create_record::<Personnel>(draft(Some(WorksiteId::new())), None)
            .await
            .unwrap_err();
        assert!(matches!(err, LedgerServiceError::Validation(_)));

        let site: Worksite = svc
            .create_record(WorksiteDraft { name: "Ataşehir".to_string() }, None)
            .await
            .unwrap();
        let person: Personnel = svc.create_record(draft(Some(site.id)), None).await.unwrap();
        assert_eq!(person.worksite, Some(site.id));

        // personnel are never referenced by entries
        svc.delete_record::<Personnel>(person.id).await.unwrap();
        assert!(svc.list_records::<Personnel>().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn rebuild_repairs_a_drifted_balance() {
        let svc = setup();
        let cid = new_customer(&svc).await;
        svc.create_entry(invoice(cid, amt(60), amt(20)), None).await.unwrap();

        // Corrupt the cached balance behind the engine's back.
        {
            use crate::store::LedgerTransaction;
            let mut tx = svc.store().begin().await.unwrap();
            let mut c = tx.lock_customer(cid).await.unwrap().unwrap();
            c.reset_balance(Decimal::from(-1), Utc::now());
            tx.save_customer(&c).await.unwrap();
            tx.commit().await.unwrap();
        }

        let drift = svc.audit_customer(cid).await.unwrap().unwrap();
        assert_eq!(drift.cached, Decimal::from(-1));
        assert_eq!(drift.expected, Decimal::from(40));

        let repaired = svc.rebuild_customer_balance(cid).await.unwrap();
        assert_eq!(repaired.balance(), Decimal::from(40));
        assert_eq!(repaired.balance_status(), BalanceStatus::Borrower);
        assert!(svc.audit_all().await.unwrap().is_consistent());
    }

    #[tokio::test]
    async fn payments_and_invoices_contribute_identically() {
        let svc = setup();
        let cid = new_customer(&svc).await;

        let mut payment = invoice(cid, amt(25), amt(5));
        payment.details = EntryDetails::Payment(PaymentDetails {
            bank: Some("Vakıfbank".to_string()),
            check_no: Some("CK-77".to_string()),
            check_time: None,
        });
        let p = svc.create_entry(payment, None).await.unwrap();
        assert_eq!(p.customer.balance(), Decimal::from(20));

        let i = svc.create_entry(invoice(cid, amt(25), amt(5)), None).await.unwrap();
        assert_eq!(i.customer.balance(), Decimal::from(40));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Create(u16, u16),
        Update(usize, u16, u16),
        Delete(usize),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u16..500, 0u16..500).prop_map(|(d, r)| Op::Create(d, r)),
            (any::<usize>(), 0u16..500, 0u16..500).prop_map(|(i, d, r)| Op::Update(i, d, r)),
            any::<usize>().prop_map(Op::Delete),
        ]
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        /// Property: after any sequence of committed writes, the cached balance
        /// equals the sum of contributions and the status matches its sign.
        #[test]
        fn balance_invariant_holds_after_any_write_sequence(ops in prop::collection::vec(op(), 1..30)) {
            let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
            rt.block_on(async {
                let svc = setup();
                let cid = new_customer(&svc).await;
                let mut live: Vec<LedgerEntryId> = Vec::new();

                for op in ops {
                    match op {
                        Op::Create(d, r) => {
                            let w = svc
                                .create_entry(invoice(cid, amt(d.into()), amt(r.into())), None)
                                .await
                                .unwrap();
                            live.push(w.entry.id);
                        }
                        Op::Update(i, d, r) if !live.is_empty() => {
                            let id = live[i % live.len()];
                            svc.update_entry(id, invoice(cid, amt(d.into()), amt(r.into())), ExpectedVersion::Any)
                                .await
                                .unwrap();
                        }
                        Op::Delete(i) if !live.is_empty() => {
                            let id = live.remove(i % live.len());
                            svc.delete_entry(id, ExpectedVersion::Any).await.unwrap();
                        }
                        _ => {}
                    }
                }

                let customer = svc.get_customer(cid).await.unwrap();
                let entries = svc.list_entries(&EntryFilter::for_customer(cid)).await.unwrap();
                let expected: Decimal = entries.iter().map(|e| e.contribution()).sum();
                assert_eq!(customer.balance(), expected);
                assert_eq!(customer.balance_status(), BalanceStatus::from_balance(expected));
                assert_eq!(entries.len(), live.len());
            });
        }
    }
}
