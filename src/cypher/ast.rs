use crate::graph::Direction;

#[derive(Clone, Debug, PartialEq)]
pub struct Query {
    pub clauses: Vec<Clause>,
}

impl Query {
    pub fn is_mutating(&self) -> bool {
        self.clauses.iter().any(|clause| {
            matches!(
                clause,
                Clause::Create(_) | Clause::Set(_) | Clause::Delete { .. }
            )
        })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Clause {
    Match {
        optional: bool,
        patterns: Vec<PathPattern>,
        predicate: Option<Expr>,
    },
    Unwind {
        expr: Expr,
        alias: String,
    },
    With {
        projection: Projection,
        predicate: Option<Expr>,
    },
    Return(Projection),
    Create(Vec<PathPattern>),
    Set(Vec<SetItem>),
    Delete {
        detach: bool,
        targets: Vec<Expr>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    pub distinct: bool,
    /// `*` projects every bound variable ahead of `items`.
    pub star: bool,
    pub items: Vec<ProjectionItem>,
    pub order_by: Vec<SortItem>,
    pub skip: Option<Expr>,
    pub limit: Option<Expr>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionItem {
    pub expr: Expr,
    /// Explicit alias, or the item's source text.
    pub name: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SortItem {
    pub expr: Expr,
    pub descending: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathPattern {
    pub start: NodePattern,
    pub steps: Vec<(RelPattern, NodePattern)>,
}

impl PathPattern {
    pub fn variables(&self) -> Vec<&str> {
        let mut vars = Vec::new();
        vars.extend(self.start.var.as_deref());
        for (rel, node) in &self.steps {
            vars.extend(rel.var.as_deref());
            vars.extend(node.var.as_deref());
        }
        vars
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct NodePattern {
    pub var: Option<String>,
    pub labels: Vec<String>,
    pub properties: Vec<(String, Expr)>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct RelPattern {
    pub var: Option<String>,
    pub types: Vec<String>,
    pub properties: Vec<(String, Expr)>,
    /// Relative to the pattern's left-to-right reading order.
    pub direction: Direction,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SetItem {
    Property {
        var: String,
        key: String,
        value: Expr,
    },
    Labels {
        var: String,
        labels: Vec<String>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    Xor,
    And,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    In,
    Contains,
    StartsWith,
    EndsWith,
    RegexMatch,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Literal),
    List(Vec<Expr>),
    Map(Vec<(String, Expr)>),
    Variable(String),
    Property(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    /// Function name is stored lower-cased.
    Call {
        name: String,
        distinct: bool,
        args: Vec<Expr>,
    },
    CountStar,
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    HasLabels(Box<Expr>, Vec<String>),
    Case {
        operand: Option<Box<Expr>>,
        branches: Vec<(Expr, Expr)>,
        otherwise: Option<Box<Expr>>,
    },
}

pub const AGGREGATES: &[&str] = &["count", "collect", "sum", "avg", "min", "max"];

impl Expr {
    pub fn is_aggregate_call(&self) -> bool {
        match self {
            Expr::CountStar => true,
            Expr::Call { name, .. } => AGGREGATES.contains(&name.as_str()),
            _ => false,
        }
    }

    pub fn contains_aggregate(&self) -> bool {
        let mut found = false;
        self.visit(&mut |expr| found |= expr.is_aggregate_call());
        found
    }

    /// Aggregate calls in evaluation order, outermost first.
    pub fn aggregate_calls(&self) -> Vec<&Expr> {
        let mut calls = Vec::new();
        self.collect_aggregates(&mut calls);
        calls
    }

    fn collect_aggregates<'a>(&'a self, out: &mut Vec<&'a Expr>) {
        if self.is_aggregate_call() {
            out.push(self);
            return;
        }
        for child in self.children() {
            child.collect_aggregates(out);
        }
    }

    fn visit(&self, f: &mut dyn FnMut(&Expr)) {
        f(self);
        for child in self.children() {
            child.visit(f);
        }
    }

    fn children(&self) -> Vec<&Expr> {
        match self {
            Expr::Literal(_) | Expr::Variable(_) | Expr::CountStar => Vec::new(),
            Expr::List(items) => items.iter().collect(),
            Expr::Map(entries) => entries.iter().map(|(_, e)| e).collect(),
            Expr::Property(base, _) => vec![base.as_ref()],
            Expr::Index(base, idx) => vec![base.as_ref(), idx.as_ref()],
            Expr::Call { args, .. } => args.iter().collect(),
            Expr::Unary(_, inner) => vec![inner.as_ref()],
            Expr::Binary(_, lhs, rhs) => vec![lhs.as_ref(), rhs.as_ref()],
            Expr::IsNull { expr, .. } => vec![expr.as_ref()],
            Expr::HasLabels(inner, _) => vec![inner.as_ref()],
            Expr::Case {
                operand,
                branches,
                otherwise,
            } => {
                let mut out: Vec<&Expr> = Vec::new();
                out.extend(operand.as_deref());
                for (when, then) in branches {
                    out.push(when);
                    out.push(then);
                }
                out.extend(otherwise.as_deref());
                out
            }
        }
    }
}
