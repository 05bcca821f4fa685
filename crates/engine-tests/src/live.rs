// These tests need running databases holding a seeded `user_data` table
// (see `TEST_MYSQL_URL` / `TEST_PG_URL`). Run them with `--ignored`.
#[cfg(test)]
mod tests {
    use crate::{mysql_connector, pg_connector};
    use engine_core::{
        error::OperationError,
        operation::{DataOperationExt, FnDataOperation, Operation, OperationExt},
        retry::RetryPolicy,
    };
    use engine_processing::{
        aggregate::stream_column_stats,
        error::StreamError,
        users::{all_users, calculate_average_age, paginate_users, stream_users},
    };
    use futures::{StreamExt, TryStreamExt};
    use model::records::row::Row;
    use tracing_test::traced_test;

    #[traced_test]
    #[tokio::test]
    #[ignore]
    async fn mysql_stream_and_paginate_agree() {
        let connector = mysql_connector();

        let streamed: Vec<Row> = stream_users(connector.clone()).try_collect().await.unwrap();
        let paged: Vec<Row> = paginate_users(connector, 7)
            .unwrap()
            .map_ok(|page| futures::stream::iter(page.rows.into_iter().map(Ok::<Row, StreamError>)))
            .try_flatten()
            .try_collect()
            .await
            .unwrap();

        assert!(!streamed.is_empty());
        assert_eq!(streamed, paged);
    }

    #[traced_test]
    #[tokio::test]
    #[ignore]
    async fn mysql_average_matches_stats() {
        let connector = mysql_connector();
        let average = calculate_average_age(connector.clone()).await.unwrap();
        let stats = stream_column_stats(connector, all_users(), "age")
            .await
            .unwrap();
        assert!((average - stats.mean).abs() < 1e-9);
    }

    #[traced_test]
    #[tokio::test]
    #[ignore]
    async fn postgres_count_through_wrappers() {
        let connector = pg_connector();
        let count = FnDataOperation::new("count_users", |conn, _: &()| {
            Box::pin(async move { Ok::<_, OperationError>(conn.count(&all_users()).await?) })
        })
        .with_transaction()
        .with_connection(connector.clone())
        .with_retry(RetryPolicy::for_database());

        let total = count.call(&()).await.unwrap();
        let streamed = stream_users(connector).count().await as u64;
        assert_eq!(total, streamed);
        assert!(!logs_contain("Retry attempts exhausted"));
    }
}
