#[cfg(test)]
mod tests {
    use crate::utils::{SAMPLE_AGES, assert_no_open_connections, connector, users_db};
    use connectors::sql::base::requests::{
        CompareOp, Condition, FetchRowsRequestBuilder, WriteRequest,
    };
    use engine_core::{
        cache::QueryCache,
        error::OperationError,
        operation::{DataOperationExt, FnDataOperation, FnOperation, Operation, OperationExt},
        retry::RetryPolicy,
    };
    use engine_processing::{
        aggregate::stream_average,
        users::{USER_TABLE, UserRecord, all_users, users_older_than},
    };
    use model::{
        core::value::Value,
        records::row::{Field, Row},
    };
    use serde::Serialize;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use tracing_test::traced_test;

    #[derive(Serialize)]
    struct OlderThan {
        min_age: i64,
    }

    fn quick_retry(max_attempts: usize) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(10)).without_jitter()
    }

    // Scenario: a cached read called twice with the same argument, once with
    // another argument, and again after its TTL has passed.
    // Expected Outcome: the database is queried for the first call of each
    // argument and once more after expiry, three times in total.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn cached_read_hits_until_ttl() {
        let db = users_db(&SAMPLE_AGES);
        let cache = Arc::new(QueryCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let read = FnDataOperation::new("users_older_than", move |conn, args: &OlderThan| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let rows = conn.fetch(&users_older_than(args.min_age)).await?;
                Ok::<_, OperationError>(rows.len())
            })
        })
        .with_connection(connector(&db))
        .with_cache(cache.clone(), Duration::from_secs(300));

        assert_eq!(read.call(&OlderThan { min_age: 30 }).await.unwrap(), 3);
        assert_eq!(read.call(&OlderThan { min_age: 30 }).await.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        assert_eq!(read.call(&OlderThan { min_age: 40 }).await.unwrap(), 1);
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        tokio::time::advance(Duration::from_secs(301)).await;
        read.call(&OlderThan { min_age: 30 }).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);

        assert_eq!(db.stats().connections_opened, 3);
        assert_no_open_connections(&db);
        assert!(logs_contain("Cache hit"));
        assert!(logs_contain("Cache entry expired"));
    }

    // Scenario: the first two statements fail with "database is locked".
    // Expected Outcome: the third attempt succeeds, each attempt on a fresh
    // connection that is released afterwards.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn transient_failures_are_retried() {
        let db = users_db(&SAMPLE_AGES);
        db.fail_next_statement("database is locked");
        db.fail_next_statement("database is locked");
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let count = FnDataOperation::new("count_users", move |conn, _: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let request = FetchRowsRequestBuilder::new(USER_TABLE).build();
                Ok::<_, OperationError>(conn.count(&request).await?)
            })
        })
        .with_connection(connector(&db))
        .with_retry(quick_retry(4));

        assert_eq!(count.call(&()).await.unwrap(), 5);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(db.stats().connections_opened, 3);
        assert_no_open_connections(&db);
        assert!(logs_contain("Attempt failed, retrying"));
        assert!(logs_contain("Succeeded after retry"));
    }

    // Scenario: the query names a table that does not exist.
    // Expected Outcome: one attempt, and the database error comes back as is.
    #[tokio::test(start_paused = true)]
    async fn permanent_failure_is_not_retried() {
        let db = users_db(&SAMPLE_AGES);
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let read = FnDataOperation::new("read_missing", move |conn, _: &()| {
            counter.fetch_add(1, Ordering::SeqCst);
            Box::pin(async move {
                let request = FetchRowsRequestBuilder::new("no_such_users").build();
                Ok::<_, OperationError>(conn.fetch(&request).await?)
            })
        })
        .with_connection(connector(&db))
        .with_retry(quick_retry(4));

        let err = read.call(&()).await.unwrap_err();
        assert!(err.to_string().contains("no such table"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_no_open_connections(&db);
    }

    // Scenario: an average over a column holding a non-numeric value, run
    // under a retry policy.
    // Expected Outcome: a single attempt; the bad value is reported at once.
    #[tokio::test(start_paused = true)]
    async fn non_numeric_value_is_not_retried() {
        let db = users_db(&[]);
        db.insert_rows(
            USER_TABLE,
            vec![Row::new(
                USER_TABLE,
                vec![
                    Field::new("user_id", "00000000-0000-4000-8000-000000000000"),
                    Field::new("name", "Old"),
                    Field::new("email", "old@example.com"),
                    Field::new("age", "old"),
                ],
            )],
        );
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = calls.clone();
        let source = connector(&db);
        let average = FnOperation::new("average_age", move |column: &String| {
            counter.fetch_add(1, Ordering::SeqCst);
            let source = source.clone();
            Box::pin(async move {
                Ok::<_, OperationError>(stream_average(source, all_users(), column).await?)
            })
        })
        .with_retry(quick_retry(4));

        let err = average.call(&"age".to_string()).await.unwrap_err();
        assert!(matches!(err, OperationError::InvalidArgument(ref m) if m.contains("'age'")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_no_open_connections(&db);
    }

    // Scenario: a transactional operation writes one user, then fails before
    // writing the second.
    // Expected Outcome: a later read sees neither user.
    #[tokio::test]
    async fn transaction_is_atomic() {
        let db = users_db(&[]);
        let ann = UserRecord::new("Ann", "ann@example.com", 30);
        let bo = UserRecord::new("Bo", "bo@example.com", 41);

        let register = FnDataOperation::new("register_pair", |conn, users: &Vec<UserRecord>| {
            Box::pin(async move {
                conn.write(&users[0].insert_request()).await?;
                Err::<(), _>(OperationError::Failed(format!(
                    "refusing to register {}",
                    users[1].name
                )))
            })
        })
        .with_transaction()
        .with_connection(connector(&db));

        let err = register.call(&vec![ann, bo]).await.unwrap_err();
        assert_eq!(err.to_string(), "Operation failed: refusing to register Bo");
        assert!(db.rows(USER_TABLE).unwrap().is_empty());
        assert_eq!(db.stats().rollbacks, 1);
        assert_eq!(db.stats().commits, 0);
        assert_no_open_connections(&db);
    }

    // Scenario: the same transactional update succeeds.
    // Expected Outcome: both statements are visible after commit.
    #[tokio::test]
    async fn transaction_commits_all_statements() {
        let db = users_db(&SAMPLE_AGES);
        let birthday = FnDataOperation::new("birthday", |conn, min_age: &i64| {
            Box::pin(async move {
                let older = vec![Condition::new("age", CompareOp::GtEq, *min_age)];
                let younger = vec![Condition::new("age", CompareOp::Lt, *min_age)];
                let promoted =
                    WriteRequest::update(USER_TABLE, vec![("age", Value::Int(99))], older);
                let reset =
                    WriteRequest::update(USER_TABLE, vec![("age", Value::Int(1))], younger);
                let a = conn.write(&promoted).await?;
                let b = conn.write(&reset).await?;
                Ok::<_, OperationError>(a + b)
            })
        })
        .with_transaction()
        .with_connection(connector(&db));

        assert_eq!(birthday.call(&35).await.unwrap(), 5);
        let ages: Vec<i64> = db
            .rows(USER_TABLE)
            .unwrap()
            .iter()
            .filter_map(|r| r.get_value("age").as_i64())
            .collect();
        assert_eq!(ages, vec![1, 99, 99, 1, 1]);
        assert_eq!(db.stats().commits, 1);
    }

    // Scenario: a connection-scoped call that succeeds and one that fails.
    // Expected Outcome: each releases its connection exactly once and the
    // failure reaches the caller unchanged.
    #[traced_test]
    #[tokio::test]
    async fn connection_released_exactly_once() {
        let db = users_db(&SAMPLE_AGES);
        let op = FnDataOperation::new("maybe_fail", |conn, fail: &bool| {
            Box::pin(async move {
                let request = FetchRowsRequestBuilder::new(USER_TABLE).limit(1).build();
                let rows = conn.fetch(&request).await?;
                if *fail {
                    return Err(OperationError::Failed("boom".to_string()));
                }
                Ok::<_, OperationError>(rows.len())
            })
        })
        .with_connection(connector(&db));

        assert_eq!(op.call(&false).await.unwrap(), 1);
        assert_eq!(db.stats().connections_closed, 1);

        let err = op.call(&true).await.unwrap_err();
        assert!(matches!(err, OperationError::Failed(ref m) if m == "boom"));
        let stats = db.stats();
        assert_eq!(stats.connections_opened, 2);
        assert_eq!(stats.connections_closed, 2);
        assert!(logs_contain("maybe_fail"));
    }

    // Scenario: the full stack, connection then transaction then retry then
    // cache, with one transient failure on the way.
    // Expected Outcome: the write lands once, and the repeated call is served
    // from the cache.
    #[traced_test]
    #[tokio::test(start_paused = true)]
    async fn wrappers_compose_in_order() {
        let db = users_db(&[]);
        let cache = Arc::new(QueryCache::new());
        let user = UserRecord::new("Cy", "cy@example.com", 52);

        let add_user = FnDataOperation::new("add_user", |conn, user: &UserRecord| {
            Box::pin(async move {
                let written = conn.write(&user.insert_request()).await?;
                Ok::<_, OperationError>(written)
            })
        })
        .with_logging()
        .with_transaction()
        .with_connection(connector(&db))
        .with_retry(quick_retry(3))
        .with_cache(cache.clone(), Duration::ZERO);

        db.fail_next_statement("connection reset by peer");
        assert_eq!(add_user.call(&user).await.unwrap(), 1);
        assert_eq!(add_user.call(&user).await.unwrap(), 1);

        assert_eq!(db.rows(USER_TABLE).unwrap().len(), 1);
        assert_eq!(cache.stats().unwrap().total_hits, 1);
        assert_no_open_connections(&db);
        assert!(logs_contain("Executing query"));
        assert!(logs_contain("Cache miss"));
    }
}
