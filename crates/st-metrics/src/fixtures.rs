//! Run-log fixtures shared by the unit tests.

use st_types::{QueryRecord, RunLog};

/// Ten items, relevant {1, 3, 7}; item 1 (relevant) and item 0 seed the
/// model, then eight single-item queries find 3 at step 1 and 7 at step 5.
pub fn scenario() -> (RunLog, Vec<u8>) {
    let mut labels = vec![0u8; 10];
    for i in [1, 3, 7] {
        labels[i] = 1;
    }
    let mut proba = vec![0.1; 10];
    proba[3] = 0.9;
    proba[7] = 0.8;
    proba[6] = 0.5;

    let mut log = RunLog::new();
    log.push_query(
        QueryRecord::initial(vec![1, 0])
            .with_posterior(proba.clone(), vec![2, 3, 4, 5, 6, 7, 8, 9]),
    );
    let picks = [3, 2, 4, 5, 7, 6, 8, 9];
    let mut pool: Vec<usize> = vec![2, 3, 4, 5, 6, 7, 8, 9];
    for (step, item) in picks.into_iter().enumerate() {
        pool.retain(|&p| p != item);
        let record = QueryRecord::query(vec![item]);
        // Steps after the third carry no new model estimate.
        let record = if step < 3 {
            record.with_posterior(proba.clone(), pool.clone())
        } else {
            record
        };
        log.push_query(record);
    }
    (log, labels)
}

/// Ten items, relevant {3, 7}; item 3 (relevant) and item 0 seed the model,
/// then eight single-item queries find 7 at step 5. Every step carries a
/// posterior.
pub fn relevant_seed() -> (RunLog, Vec<u8>) {
    let mut labels = vec![0u8; 10];
    labels[3] = 1;
    labels[7] = 1;
    let mut proba = vec![0.1; 10];
    proba[7] = 0.6;
    proba[2] = 0.8;

    let mut pool: Vec<usize> = vec![1, 2, 4, 5, 6, 7, 8, 9];
    let mut log = RunLog::new();
    log.push_query(QueryRecord::initial(vec![3, 0]).with_posterior(proba.clone(), pool.clone()));
    for item in [2, 1, 4, 5, 7, 6, 8, 9] {
        pool.retain(|&p| p != item);
        log.push_query(QueryRecord::query(vec![item]).with_posterior(proba.clone(), pool.clone()));
    }
    (log, labels)
}
