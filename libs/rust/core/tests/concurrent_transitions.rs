use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use fedledger_core::{
    AggregationRequest, FederatedContract, InitParams, LedgerBackend, LocalModelSubmission, MemoryBackend, SledBackend,
};

fn upload(model_id: String, client_id: String) -> LocalModelSubmission {
    LocalModelSubmission {
        model_id,
        client_id,
        weights: "{}".into(),
        latent_features: "{}".into(),
        prototypes: "{}".into(),
        accuracy: 0.5,
        loss: 0.5,
        alignment_loss: 0.0,
        data_size: 1,
    }
}

fn hammer<B: LedgerBackend>(contract: &FederatedContract<B>, threads: usize, per_thread: usize) {
    std::thread::scope(|s| {
        for t in 0..threads {
            s.spawn(move || {
                let client = format!("c{t}");
                contract.register_client(&client, if t % 2 == 0 { "source" } else { "target" }, 100).unwrap();
                for i in 0..per_thread {
                    contract.submit_local_model(upload(format!("m{t}-{i}"), client.clone())).unwrap();
                }
            });
        }
    });
}

#[test]
fn concurrent_registrations_and_submissions_are_all_indexed() {
    let contract = FederatedContract::new(MemoryBackend::default(), InitParams::default());
    contract.init().unwrap();
    hammer(&contract, 8, 10);

    assert_eq!(contract.get_all_clients().unwrap().len(), 8);
    assert_eq!(contract.get_local_models_by_round(0).unwrap().len(), 80);
    // one committed transition per call: init + 8 registrations + 80 submissions
    assert_eq!(contract.ledger().height().unwrap(), 89);
}

#[test]
fn duplicate_registration_race_has_one_winner() {
    let contract = FederatedContract::new(MemoryBackend::default(), InitParams::default());
    let wins = AtomicU64::new(0);
    std::thread::scope(|s| {
        for _ in 0..6 {
            s.spawn(|| {
                if contract.register_client("shared", "source", 1).is_ok() {
                    wins.fetch_add(1, Ordering::SeqCst);
                }
            });
        }
    });
    assert_eq!(wins.load(Ordering::SeqCst), 1);
    assert_eq!(contract.get_all_clients().unwrap().len(), 1);
}

#[test]
fn aggregation_interleaved_with_submissions_on_sled() {
    let contract = FederatedContract::new(SledBackend::temporary().unwrap(), InitParams::default());
    contract.init().unwrap();
    hammer(&contract, 4, 5);

    let pending: Vec<String> =
        contract.get_local_models_by_round(0).unwrap().into_iter().map(|m| m.model_id).collect();
    assert_eq!(pending.len(), 20);
    let outcome = contract
        .aggregate_models(AggregationRequest {
            model_ids: pending,
            aggregated_weights: "{}".into(),
            aggregated_prototypes: "{}".into(),
            global_accuracy: 0.5,
            global_loss: 0.5,
            alignment_score: 1.0,
        })
        .unwrap();
    assert_eq!(outcome.global_model.source_clients, 10);
    assert_eq!(outcome.global_model.target_clients, 10);
    assert!(contract.get_local_models_by_round(0).unwrap().is_empty());
    assert_eq!(contract.get_aggregation_config().unwrap().current_round, 1);
}

#[test]
fn queries_never_observe_a_partial_aggregation() {
    for _ in 0..20 {
        let contract = FederatedContract::new(MemoryBackend::default(), InitParams::default());
        contract.init().unwrap();
        contract.register_client("c1", "source", 1).unwrap();
        let ids: Vec<String> = (0..50).map(|i| format!("m{i}")).collect();
        for id in &ids {
            contract.submit_local_model(upload(id.clone(), "c1".into())).unwrap();
        }
        let request = AggregationRequest {
            model_ids: ids,
            aggregated_weights: "{}".into(),
            aggregated_prototypes: "{}".into(),
            global_accuracy: 0.5,
            global_loss: 0.5,
            alignment_score: 1.0,
        };

        let done = AtomicBool::new(false);
        std::thread::scope(|s| {
            s.spawn(|| {
                while !done.load(Ordering::SeqCst) {
                    let pending = contract.get_local_models_by_round(0).unwrap().len();
                    assert!(pending == 0 || pending == 50, "saw {pending} pending models");
                    let status = contract.get_round_status().unwrap();
                    assert!(
                        (status.current_round, status.pending_submissions) == (0, 50)
                            || (status.current_round, status.pending_submissions) == (1, 0),
                        "inconsistent round status {status:?}"
                    );
                }
            });
            contract.aggregate_models(request).unwrap();
            done.store(true, Ordering::SeqCst);
        });
        assert!(contract.get_local_models_by_round(0).unwrap().is_empty());
    }
}
