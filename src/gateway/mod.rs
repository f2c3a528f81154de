//! The data access boundary consumed by the metrics engine.
//!
//! Everything the orchestrator knows about persistence goes through
//! [`DataGateway`]. Implementations must be read-only and idempotent so that
//! concurrent calls, retries and cancellation are safe.

pub mod record;

use async_trait::async_trait;

pub use record::{status, Dimension, EntityType, Field, Record};

use crate::error::Result;
use crate::query::builder::Filter;

/// Numeric aggregate supported by [`DataGateway::aggregate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Sum,
    Avg,
}

impl AggregateOp {
    pub fn sql(&self) -> &'static str {
        match self {
            AggregateOp::Sum => "SUM",
            AggregateOp::Avg => "AVG",
        }
    }
}

/// One row of a `group_by` result: the dimension key, the number of records
/// and the sum of their value field.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub key: String,
    pub count: u64,
    pub sum: f64,
}

/// Which fields `find_many` should populate. `Id` and `CreatedAt` are
/// always loaded.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Projection {
    #[default]
    All,
    Fields(Vec<Field>),
}

impl Projection {
    pub fn includes(&self, field: Field) -> bool {
        match self {
            Projection::All => true,
            Projection::Fields(fields) => {
                matches!(field, Field::Id | Field::CreatedAt) || fields.contains(&field)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrderBy {
    pub field: Field,
    pub descending: bool,
}

/// Parameters of a `find_many` read.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindQuery {
    pub filter: Filter,
    pub projection: Projection,
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
}

impl FindQuery {
    pub fn new(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    pub fn select(mut self, fields: &[Field]) -> Self {
        self.projection = Projection::Fields(fields.to_vec());
        self
    }

    pub fn order_by(mut self, field: Field) -> Self {
        self.order_by = Some(OrderBy {
            field,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, field: Field) -> Self {
        self.order_by = Some(OrderBy {
            field,
            descending: true,
        });
        self
    }

    pub fn limit(mut self, n: u32) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Read-only access to CRM entities.
///
/// Faults (connection loss, query failure, timeout) are reported as errors
/// for which [`crate::Error::is_data_access`] is true.
#[async_trait]
pub trait DataGateway: Send + Sync {
    async fn count(&self, entity: EntityType, filter: &Filter) -> Result<u64>;

    /// `SUM`/`AVG` of `field` over matching records; 0 when nothing matches.
    async fn aggregate(
        &self,
        entity: EntityType,
        filter: &Filter,
        op: AggregateOp,
        field: Field,
    ) -> Result<f64>;

    async fn group_by(
        &self,
        entity: EntityType,
        filter: &Filter,
        dimension: Dimension,
    ) -> Result<Vec<GroupRow>>;

    async fn find_many(&self, entity: EntityType, query: &FindQuery) -> Result<Vec<Record>>;
}
