use model::core::value::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Gt,
    GtEq,
    Lt,
    LtEq,
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let op = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "<>",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
        };
        f.write_str(op)
    }
}

/// `column <op> value`; a request's conditions are ANDed together.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl Condition {
    pub fn new(column: &str, op: CompareOp, value: impl Into<Value>) -> Self {
        Self {
            column: column.to_string(),
            op,
            value: value.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchRowsRequest {
    pub table: String,
    /// Empty means every column.
    pub columns: Vec<String>,
    pub conditions: Vec<Condition>,
    pub order_by: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl FetchRowsRequest {
    /// Same request addressed at a `(limit, offset)` window.
    pub fn page(&self, limit: usize, offset: usize) -> Self {
        Self {
            limit: Some(limit),
            offset: Some(offset),
            ..self.clone()
        }
    }
}

pub struct FetchRowsRequestBuilder {
    table: String,
    columns: Vec<String>,
    conditions: Vec<Condition>,
    order_by: Option<String>,
    limit: Option<usize>,
    offset: Option<usize>,
}

impl FetchRowsRequestBuilder {
    pub fn new(table: &str) -> Self {
        FetchRowsRequestBuilder {
            table: table.to_string(),
            columns: Vec::new(),
            conditions: Vec::new(),
            order_by: None,
            limit: None,
            offset: None,
        }
    }

    pub fn columns(mut self, columns: &[&str]) -> Self {
        self.columns = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn filter(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn order_by(mut self, column: &str) -> Self {
        self.order_by = Some(column.to_string());
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = Some(offset);
        self
    }

    pub fn build(self) -> FetchRowsRequest {
        FetchRowsRequest {
            table: self.table,
            columns: self.columns,
            conditions: self.conditions,
            order_by: self.order_by,
            limit: self.limit,
            offset: self.offset,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteRequest {
    Insert {
        table: String,
        values: Vec<(String, Value)>,
    },
    Update {
        table: String,
        set: Vec<(String, Value)>,
        conditions: Vec<Condition>,
    },
    Delete {
        table: String,
        conditions: Vec<Condition>,
    },
}

impl WriteRequest {
    pub fn insert(table: &str, values: Vec<(&str, Value)>) -> Self {
        WriteRequest::Insert {
            table: table.to_string(),
            values: values
                .into_iter()
                .map(|(c, v)| (c.to_string(), v))
                .collect(),
        }
    }

    pub fn update(table: &str, set: Vec<(&str, Value)>, conditions: Vec<Condition>) -> Self {
        WriteRequest::Update {
            table: table.to_string(),
            set: set.into_iter().map(|(c, v)| (c.to_string(), v)).collect(),
            conditions,
        }
    }

    pub fn delete(table: &str, conditions: Vec<Condition>) -> Self {
        WriteRequest::Delete {
            table: table.to_string(),
            conditions,
        }
    }

    pub fn table(&self) -> &str {
        match self {
            WriteRequest::Insert { table, .. }
            | WriteRequest::Update { table, .. }
            | WriteRequest::Delete { table, .. } => table,
        }
    }
}
