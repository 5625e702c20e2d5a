//! End-to-end ledger tests against the in-memory store.
//!
//! Verifies:
//! - Totals reconcile with line items
//! - Stock moves exactly once per line item and per received order
//! - Job transitions, and the record materialized on completion
//! - Atomic rollback, RBAC filtering and reporting math

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use rust_decimal_macros::dec;

    use workshop_auth::Principal;
    use workshop_core::{DomainError, PartId, UserId};
    use workshop_inventory::{NewPart, OversellPolicy, Part};
    use workshop_jobs::{ApproveJob, CompleteJob, JobStatus, RejectJob, StartJob};
    use workshop_purchasing::{NewOrderEntry, NewPurchaseOrder, PurchaseOrderStatus};
    use workshop_service::{
        CreateServiceRecord, ItemType, LineItemInput, ServiceStatus, UpdateServiceRecord,
        VehicleDetails, VisitDetails, job_number_for,
    };

    use crate::config::{LedgerConfig, MissingPartPolicy};
    use crate::reporting::DateRange;
    use crate::store::{InMemoryStore, StoreTx, WorkshopStore};
    use crate::workshop::Workshop;

    fn workshop() -> Workshop<InMemoryStore> {
        Workshop::new(InMemoryStore::new())
    }

    async fn add_part(
        w: &Workshop<InMemoryStore>,
        sku: &str,
        price: rust_decimal::Decimal,
        stock: i64,
    ) -> Part {
        w.create_part(NewPart {
            sku: sku.to_string(),
            name: format!("Part {sku}"),
            category: None,
            price,
            stock,
            min_stock_level: None,
        })
        .await
        .unwrap()
    }

    fn visit(registration: &str, items: Vec<LineItemInput>) -> CreateServiceRecord {
        CreateServiceRecord {
            vehicle: VehicleDetails {
                registration_number: Some(registration.to_string()),
                ..VehicleDetails::default()
            },
            items,
            ..CreateServiceRecord::default()
        }
    }

    fn now() -> chrono::DateTime<Utc> {
        Utc::now()
    }

    fn approve() -> ApproveJob {
        ApproveJob {
            approved_by: "Manager".to_string(),
            mechanic_id: None,
            estimated_cost: None,
            notes: None,
            occurred_at: now(),
        }
    }

    #[tokio::test]
    async fn taxed_discounted_part_line_reconciles() {
        let w = workshop();
        let part = add_part(&w, "TYR-01", dec!(1200), 10).await;

        let created = w
            .create_service_record(visit(
                "KA01AB1234",
                vec![LineItemInput {
                    discount_percent: Some(dec!(10)),
                    cgst_percent: Some(dec!(9)),
                    sgst_percent: Some(dec!(9)),
                    ..LineItemInput::part(part.id, 2, dec!(1200))
                }],
            ))
            .await
            .unwrap();

        let line = &created.lines[0];
        assert_eq!(line.pricing.discount_amount, dec!(240));
        assert_eq!(line.pricing.taxable_value, dec!(2160));
        assert_eq!(line.pricing.cgst_amount, dec!(194.4));
        assert_eq!(line.pricing.sgst_amount, dec!(194.4));
        assert_eq!(line.line_total(), dec!(2548.8));
        assert_eq!(line.description, "Part TYR-01");
        assert_eq!(line.uom, "Nos");
        assert_eq!(line.issue_type, "Paid");
        assert_eq!(created.record.total_cost, dec!(2548.8));
        assert!(created.is_reconciled());

        let stored = w.get_service_record(created.record.id).await.unwrap();
        assert_eq!(stored, created);
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 8);
    }

    #[tokio::test]
    async fn stock_is_decremented_once_and_never_restored() {
        let w = workshop();
        let part = add_part(&w, "BRK-01", dec!(450), 50).await;

        let created = w
            .create_service_record(visit(
                "KA01AB1234",
                vec![
                    LineItemInput::part(part.id, 3, dec!(450)),
                    LineItemInput::labor("Brake service", dec!(300)),
                ],
            ))
            .await
            .unwrap();
        assert_eq!(created.record.total_cost, dec!(1650));
        assert_eq!(created.lines[1].item_type, ItemType::Labor);
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 47);

        let updated = w
            .update_service_record(
                created.record.id,
                UpdateServiceRecord {
                    status: Some(ServiceStatus::InProgress),
                    mechanic_notes: Some("Pads replaced".to_string()),
                    ..UpdateServiceRecord::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.status, ServiceStatus::InProgress);
        assert_eq!(updated.total_cost, dec!(1650));
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 47);

        w.delete_service_record(created.record.id).await.unwrap();
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 47);
        assert_eq!(w.stock_movements(part.id).await.unwrap().len(), 1);

        let err = w.get_service_record(created.record.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound(_))));
        let err = w.delete_service_record(created.record.id).await.unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::NotFound(_))));
    }

    #[tokio::test]
    async fn simultaneous_visits_both_decrement_the_same_part() {
        let w = workshop();
        let part = add_part(&w, "BRK-01", dec!(450), 50).await;

        let (first, second) = tokio::join!(
            w.create_service_record(visit(
                "KA01AB1234",
                vec![LineItemInput::part(part.id, 3, dec!(450))],
            )),
            w.create_service_record(visit(
                "KA02CD5678",
                vec![LineItemInput::part(part.id, 4, dec!(450))],
            )),
        );
        first.unwrap();
        second.unwrap();

        assert_eq!(w.get_part(part.id).await.unwrap().stock, 43);
        let movements = w.stock_movements(part.id).await.unwrap();
        assert_eq!(movements.len(), 2);
        let mut deltas: Vec<i64> = movements.iter().map(|m| m.delta).collect();
        deltas.sort();
        assert_eq!(deltas, vec![-4, -3]);
    }

    #[tokio::test]
    async fn spawned_visits_lose_no_update() {
        let w = std::sync::Arc::new(workshop());
        let part_id = add_part(&w, "BRK-01", dec!(450), 50).await.id;

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let w = std::sync::Arc::clone(&w);
                tokio::spawn(async move {
                    w.create_service_record(visit(
                        &format!("KA01AB{i:04}"),
                        vec![LineItemInput::part(part_id, 2, dec!(450))],
                    ))
                    .await
                })
            })
            .collect();
        for handle in handles {
            handle.await.unwrap().unwrap();
        }

        assert_eq!(w.get_part(part_id).await.unwrap().stock, 34);
        assert_eq!(w.stock_movements(part_id).await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn receiving_twice_increments_once() {
        let w = workshop();
        let part = add_part(&w, "FLT-01", dec!(250), 5).await;
        let po = w
            .create_order(NewPurchaseOrder {
                supplier: "Bosch".to_string(),
                vendor_id: None,
                order_date: None,
                entries: vec![NewOrderEntry {
                    part_id: Some(part.id),
                    quantity: 10,
                }],
            })
            .await
            .unwrap();

        let received = w
            .update_order_status(po.id, PurchaseOrderStatus::Received)
            .await
            .unwrap();
        assert_eq!(received.status, PurchaseOrderStatus::Received);
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 15);

        w.update_order_status(po.id, PurchaseOrderStatus::Received)
            .await
            .unwrap();
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 15);
        assert_eq!(w.stock_movements(part.id).await.unwrap().len(), 1);

        w.delete_order(po.id).await.unwrap();
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 15);
    }

    #[tokio::test]
    async fn rejected_job_cannot_be_approved() {
        let w = workshop();
        let created = w
            .create_service_record(CreateServiceRecord {
                submit_to_job_board: true,
                ..visit("KA01AB1234", vec![])
            })
            .await
            .unwrap();
        let job = w.list_jobs().await.unwrap().remove(0);
        assert_eq!(job.job_number, job_number_for(created.record.id));

        let rejected = w
            .reject_job(
                job.id,
                RejectJob {
                    rejected_by: String::new(),
                    reason: "budget".to_string(),
                    occurred_at: now(),
                },
            )
            .await
            .unwrap();
        assert_eq!(rejected.status, JobStatus::Rejected);
        assert_eq!(rejected.rejected_by.as_deref(), Some("Manager"));

        let err = w.approve_job(job.id, approve()).await.unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvalidTransition { .. })
        ));
        assert_eq!(w.get_job(job.id).await.unwrap().status, JobStatus::Rejected);
    }

    #[tokio::test]
    async fn completing_a_submitted_job_materializes_a_record() {
        let w = workshop();
        let created = w
            .create_service_record(CreateServiceRecord {
                details: VisitDetails {
                    service_type: Some("Periodic".to_string()),
                    complaint: Some("Oil change due".to_string()),
                    ..VisitDetails::default()
                },
                assigned_approver: Some("Workshop Manager".to_string()),
                ..visit("KA01AB1234", vec![LineItemInput::labor("Oil change", dec!(700))])
            })
            .await
            .unwrap();

        let job = w.list_jobs().await.unwrap().remove(0);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.repair_type, "Periodic");
        assert_eq!(job.description, "Oil change due");
        assert_eq!(job.submitted_by, "Service Advisor");
        assert_eq!(job.assigned_approver.as_deref(), Some("Workshop Manager"));
        assert_eq!(job.estimated_cost, Some(dec!(700)));
        assert_eq!(job.notes.as_deref(), Some("Auto-generated from Service Record"));
        assert_eq!(job.vehicle_id, Some(created.record.vehicle_id));

        w.approve_job(job.id, approve()).await.unwrap();
        w.start_job(job.id, StartJob { occurred_at: now() })
            .await
            .unwrap();
        let done = w
            .complete_job(
                job.id,
                CompleteJob {
                    final_cost: None,
                    notes: Some("Done".to_string()),
                    occurred_at: now(),
                },
            )
            .await
            .unwrap();

        assert_eq!(done.ticket.status, JobStatus::Completed);
        let record = done.record.expect("vehicle-linked job yields a record");
        assert_eq!(record.record.status, ServiceStatus::Completed);
        assert_eq!(record.record.vehicle_id, created.record.vehicle_id);
        assert_eq!(record.record.total_cost, dec!(700));
        assert_eq!(record.lines.len(), 1);
        assert!(record.is_reconciled());

        let stored = w.get_service_record(record.record.id).await.unwrap();
        assert_eq!(stored.record.details.complaint.as_deref(), Some("Oil change due"));

        let err = w
            .complete_job(
                job.id,
                CompleteJob {
                    final_cost: None,
                    notes: None,
                    occurred_at: now(),
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            err.domain(),
            Some(DomainError::InvalidTransition { .. })
        ));
    }

    #[tokio::test]
    async fn abort_policy_rolls_back_the_whole_visit() {
        let w = workshop().with_ledger_config(LedgerConfig {
            missing_part: MissingPartPolicy::Abort,
            ..LedgerConfig::default()
        });
        let part = add_part(&w, "BRK-01", dec!(450), 50).await;

        let err = w
            .create_service_record(CreateServiceRecord {
                submit_to_job_board: true,
                ..visit(
                    "KA01AB1234",
                    vec![
                        LineItemInput::part(part.id, 3, dec!(450)),
                        LineItemInput::part(PartId::new(999), 1, dec!(10)),
                    ],
                )
            })
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::PartNotFound(PartId::new(999))));

        assert_eq!(w.get_part(part.id).await.unwrap().stock, 50);
        assert!(w.stock_movements(part.id).await.unwrap().is_empty());
        assert!(w.list_jobs().await.unwrap().is_empty());
        assert!(w.service_history(&Principal::admin(UserId::new())).await.unwrap().is_empty());

        let mut tx = w.store().begin().await.unwrap();
        assert!(tx.find_vehicle_by_registration("KA01AB1234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversell_reject_refuses_the_visit() {
        let w = workshop().with_ledger_config(LedgerConfig {
            oversell: OversellPolicy::Reject,
            ..LedgerConfig::default()
        });
        let part = add_part(&w, "BRK-01", dec!(450), 2).await;

        let err = w
            .create_service_record(visit(
                "KA01AB1234",
                vec![LineItemInput::part(part.id, 5, dec!(450))],
            ))
            .await
            .unwrap_err();
        match err.domain() {
            Some(DomainError::InsufficientStock {
                part_id,
                available,
                requested,
            }) => {
                assert_eq!(*part_id, part.id);
                assert_eq!(*available, 2);
                assert_eq!(*requested, 5);
            }
            other => panic!("Expected InsufficientStock, got {other:?}"),
        }
        assert_eq!(w.get_part(part.id).await.unwrap().stock, 2);
    }

    #[tokio::test]
    async fn validation_happens_before_any_write() {
        let w = workshop();
        let err = w
            .create_service_record(CreateServiceRecord::default())
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::VehicleRequired));

        let err = w
            .create_service_record(visit(
                "KA01AB1234",
                vec![LineItemInput {
                    quantity: Some(-1),
                    ..LineItemInput::labor("Wash", dec!(100))
                }],
            ))
            .await
            .unwrap_err();
        assert!(matches!(err.domain(), Some(DomainError::InvalidInput(_))));

        let mut tx = w.store().begin().await.unwrap();
        assert!(tx.find_vehicle_by_registration("KA01AB1234").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn history_is_scoped_to_owned_vehicles() {
        let w = workshop();
        let (alice, bob) = (UserId::new(), UserId::new());
        for (registration, owner, days_ago) in [("KA01A1", alice, 2), ("KA01B2", bob, 1)] {
            w.create_service_record(CreateServiceRecord {
                vehicle: VehicleDetails {
                    registration_number: Some(registration.to_string()),
                    owner_user_id: Some(owner),
                    ..VehicleDetails::default()
                },
                date: Some(now() - Duration::days(days_ago)),
                ..CreateServiceRecord::default()
            })
            .await
            .unwrap();
        }

        let admin = Principal::admin(UserId::new());
        let all = w.service_history(&admin).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].date > all[1].date);

        let mine = w.service_history(&Principal::user(alice)).await.unwrap();
        assert_eq!(mine.len(), 1);
        assert!(w.service_history(&Principal::user(UserId::new())).await.unwrap().is_empty());

        let err = w
            .detailed_report(&Principal::user(alice), DateRange::All)
            .await
            .unwrap_err();
        assert_eq!(err.domain(), Some(&DomainError::Unauthorized));
        assert_eq!(w.detailed_report(&admin, DateRange::All).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn reporting_math() {
        let w = workshop();
        let cheap = add_part(&w, "CHP-01", dec!(10), 3).await;
        let dear = add_part(&w, "DER-01", dec!(1000), 20).await;

        w.create_service_record(CreateServiceRecord {
            status: Some(ServiceStatus::Completed),
            details: VisitDetails {
                service_type: Some("Repair".to_string()),
                ..VisitDetails::default()
            },
            ..visit("KA01AB1234", vec![LineItemInput::labor("Engine", dec!(1500))])
        })
        .await
        .unwrap();
        w.create_service_record(CreateServiceRecord {
            status: Some(ServiceStatus::Completed),
            ..visit("KA01AB1234", vec![LineItemInput::part(dear.id, 1, dec!(1000))])
        })
        .await
        .unwrap();
        w.create_service_record(visit(
            "KA01AB1234",
            vec![LineItemInput::labor("Wash", dec!(200))],
        ))
        .await
        .unwrap();

        let stats = w.general_stats(DateRange::Daily).await.unwrap();
        assert_eq!(stats.revenue, dec!(2500));
        assert_eq!(stats.job_count, 3);
        assert_eq!(stats.low_stock_count, 1);

        let points = w.revenue_over_time(DateRange::All).await.unwrap();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].revenue, dec!(2500));

        let dist = w.service_distribution(DateRange::All).await.unwrap();
        assert!(dist.by_status.contains(&(ServiceStatus::Completed, 2)));
        assert!(dist.by_status.contains(&(ServiceStatus::Pending, 1)));
        assert_eq!(dist.by_service_type.get("Unspecified"), Some(&2));
        assert_eq!(dist.by_service_type.get("Repair"), Some(&1));

        let valuation = w.inventory_valuation(Some(1)).await.unwrap();
        assert_eq!(valuation.total_value, dec!(19030));
        assert_eq!(valuation.total_units, 22);
        assert_eq!(valuation.top_parts.len(), 1);
        assert_eq!(valuation.top_parts[0].id, dear.id);

        let low = w.low_stock_parts().await.unwrap();
        assert_eq!(low.iter().map(|p| p.id).collect::<Vec<_>>(), vec![cheap.id]);

        let jobs = w.job_status_distribution().await.unwrap();
        assert!(jobs.iter().all(|(_, count)| *count == 0));
    }
}
