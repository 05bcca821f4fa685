//! Call interfaces shared by every wrapper in this crate.
//!
//! A [`DataOperation`] runs against a connection it is handed; an
//! [`Operation`] is self-contained. Wrappers take one and expose one, so
//! they stack: `op.with_transaction().with_connection(connector)
//! .with_retry(policy).with_cache(cache, ttl)`.

use crate::{
    cache::{QueryCache, WithCache},
    classify::ErrorClassifier,
    connection::WithConnection,
    error::OperationError,
    logging::WithLogging,
    retry::{RetryPolicy, WithRetry},
    transaction::WithTransaction,
};
use async_trait::async_trait;
use connectors::connection::{Connection, Connector};
use futures::future::BoxFuture;
use serde::Serialize;
use std::{marker::PhantomData, sync::Arc, time::Duration};

/// An operation that needs an open connection.
#[async_trait]
pub trait DataOperation: Send + Sync {
    /// Call arguments. They never include the connection, which keeps them
    /// usable as a cache key.
    type Args: Serialize + Send + Sync;
    type Output: Send;

    /// Stable identity used in logs and cache keys.
    fn name(&self) -> &str;

    async fn run(
        &self,
        conn: &mut dyn Connection,
        args: &Self::Args,
    ) -> Result<Self::Output, OperationError>;
}

/// An operation that manages its own resources.
#[async_trait]
pub trait Operation: Send + Sync {
    type Args: Serialize + Send + Sync;
    type Output: Send;

    fn name(&self) -> &str;

    async fn call(&self, args: &Self::Args) -> Result<Self::Output, OperationError>;
}

/// Adapts a closure into a [`DataOperation`].
///
/// ```ignore
/// let count = FnDataOperation::new("count_users", |conn, _args: &()| {
///     Box::pin(async move { Ok(conn.count(&request).await?) })
/// });
/// ```
pub struct FnDataOperation<F, A, O> {
    name: String,
    f: F,
    _marker: PhantomData<fn(&A) -> O>,
}

impl<F, A, O> FnDataOperation<F, A, O>
where
    F: for<'c> Fn(&'c mut dyn Connection, &'c A) -> BoxFuture<'c, Result<O, OperationError>>
        + Send
        + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, A, O> DataOperation for FnDataOperation<F, A, O>
where
    F: for<'c> Fn(&'c mut dyn Connection, &'c A) -> BoxFuture<'c, Result<O, OperationError>>
        + Send
        + Sync,
    A: Serialize + Send + Sync,
    O: Send,
{
    type Args = A;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn run(&self, conn: &mut dyn Connection, args: &A) -> Result<O, OperationError> {
        (self.f)(conn, args).await
    }
}

/// Adapts a closure into an [`Operation`].
pub struct FnOperation<F, A, O> {
    name: String,
    f: F,
    _marker: PhantomData<fn(&A) -> O>,
}

impl<F, A, O> FnOperation<F, A, O>
where
    F: for<'a> Fn(&'a A) -> BoxFuture<'a, Result<O, OperationError>> + Send + Sync,
{
    pub fn new(name: &str, f: F) -> Self {
        Self {
            name: name.to_string(),
            f,
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<F, A, O> Operation for FnOperation<F, A, O>
where
    F: for<'a> Fn(&'a A) -> BoxFuture<'a, Result<O, OperationError>> + Send + Sync,
    A: Serialize + Send + Sync,
    O: Send,
{
    type Args = A;
    type Output = O;

    fn name(&self) -> &str {
        &self.name
    }

    async fn call(&self, args: &A) -> Result<O, OperationError> {
        (self.f)(args).await
    }
}

pub trait DataOperationExt: DataOperation + Sized {
    /// Opens a connection from `connector` for every call.
    fn with_connection(self, connector: Arc<dyn Connector>) -> WithConnection<Self> {
        WithConnection::new(connector, self)
    }

    fn with_transaction(self) -> WithTransaction<Self> {
        WithTransaction::new(self)
    }

    /// Retries on the same connection.
    fn with_retry(self, policy: RetryPolicy) -> WithRetry<Self> {
        WithRetry::new(self, policy, ErrorClassifier::default())
    }

    fn with_logging(self) -> WithLogging<Self> {
        WithLogging::new(self)
    }
}

impl<T: DataOperation> DataOperationExt for T {}

pub trait OperationExt: Operation + Sized {
    /// Retries the whole call, so a wrapped [`WithConnection`] reconnects
    /// on every attempt.
    fn with_retry(self, policy: RetryPolicy) -> WithRetry<Self> {
        WithRetry::new(self, policy, ErrorClassifier::default())
    }

    fn with_cache(self, cache: Arc<QueryCache>, ttl: Duration) -> WithCache<Self> {
        WithCache::new(self, cache, ttl)
    }

    fn with_logging(self) -> WithLogging<Self> {
        WithLogging::new(self)
    }
}

impl<T: Operation> OperationExt for T {}
