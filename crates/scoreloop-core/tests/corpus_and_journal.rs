use scoreloop_core::{
    load_corpus, AccuracyMetric, ApplyOutcome, EventId, GateStage, ProposalJournal, RevisionPlan,
    RevisionTrigger, ScoreloopError,
};
use tempfile::tempdir;

fn trigger(cycle_id: &str, stage: GateStage, percent: f64) -> RevisionTrigger {
    RevisionTrigger {
        cycle_id: cycle_id.into(),
        stage,
        accuracy: AccuracyMetric::new(percent).unwrap(),
    }
}

#[test]
fn corpus_file_keeps_line_order() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("races.md");
    std::fs::write(
        &path,
        "- https://db.netkeiba.com/race/?race_id=202406050811\n\n\
         - https://db.netkeiba.com/race/?race_id=202405050812\n\
         https://db.netkeiba.com/race/?race_id=202409040611\n",
    )
    .unwrap();

    let corpus = load_corpus(&path).unwrap();

    assert_eq!(corpus.len(), 3);
    let keys: Vec<&str> = corpus.iter().map(EventId::key).collect();
    assert_eq!(keys, vec!["202406050811", "202405050812", "202409040611"]);
    assert_eq!(corpus.prefix(2).len(), 2);
}

#[test]
fn missing_corpus_file_is_a_load_error() {
    let dir = tempdir().unwrap();
    let err = load_corpus(&dir.path().join("absent.txt")).unwrap_err();

    assert!(matches!(err, ScoreloopError::CorpusLoad { .. }));
    assert!(err.is_fatal());
}

#[test]
fn journal_survives_reopen() {
    let dir = tempdir().unwrap();
    let log = dir.path().join("state/proposals.jsonl");
    let memory = dir.path().join("state/agent-memory.md");

    {
        let journal = ProposalJournal::open(&log, &memory).unwrap();
        journal
            .append(
                &trigger("c1", GateStage::Preliminary, 22.5),
                &RevisionPlan::new("weight last-3 finishing positions"),
                ApplyOutcome::Applied,
            )
            .unwrap();
        journal
            .append(
                &trigger("c2", GateStage::Final, 28.0),
                &RevisionPlan::new("penalise long layoffs"),
                ApplyOutcome::Failed {
                    reason: "mutator rejected the patch".into(),
                },
            )
            .unwrap();
    }

    let reopened = ProposalJournal::open(&log, &memory).unwrap();
    let entries = reopened.history().entries().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].seq, 1);
    assert_eq!(entries[1].seq, 2);
    assert_eq!(entries[1].cycle_id, "c2");
    assert!(entries.iter().all(|e| e.digest_matches()));
    assert_eq!(reopened.memory().len().unwrap(), 2);

    let rendered = std::fs::read_to_string(&memory).unwrap();
    assert!(rendered.starts_with("# Revision memory"));
    assert!(rendered.contains("weight last-3 finishing positions"));
    assert!(rendered.contains("apply failed: mutator rejected the patch"));
    assert_eq!(rendered, reopened.memory().render().unwrap());
}
