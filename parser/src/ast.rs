//! Abstract Syntax Tree types for MEW.

use std::fmt;

/// Source location for error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub start: usize,
    pub end: usize,
    pub line: usize,
    pub column: usize,
}

impl Span {
    pub fn new(start: usize, end: usize, line: usize, column: usize) -> Self {
        Self {
            start,
            end,
            line,
            column,
        }
    }
}

/// A statement in the MEW language. Statements form a closed sum; every
/// phase (analyze, plan, execute) dispatches exhaustively over this enum.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Match(MatchStmt),
    MatchMutate(MatchMutateStmt),
    MatchWalk(MatchWalkStmt),
    Spawn(SpawnStmt),
    Kill(KillStmt),
    Link(LinkStmt),
    Unlink(UnlinkStmt),
    Set(SetStmt),
    Walk(WalkStmt),
    Inspect(InspectStmt),
    Txn(TxnStmt),
    Show(ShowStmt),
    CreateIndex(IndexStmt),
    DropIndex(IndexStmt),
    Ontology(OntologyStmt),
    Explain(ExplainStmt),
    Profile(ProfileStmt),
    DryRun(DryRunStmt),
    Versioning(VersioningStmt),
}

impl Stmt {
    /// True for statements that write to the graph.
    pub fn is_transformation(&self) -> bool {
        matches!(
            self,
            Stmt::Spawn(_)
                | Stmt::Kill(_)
                | Stmt::Link(_)
                | Stmt::Unlink(_)
                | Stmt::Set(_)
                | Stmt::MatchMutate(_)
        )
    }
}

// ==================== MATCH ====================

/// MATCH statement for pattern matching.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStmt {
    pub pattern: Vec<PatternElem>,
    pub where_clause: Option<Expr>,
    pub return_clause: ReturnClause,
    pub order_by: Option<Vec<OrderTerm>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    /// Wall-clock budget in milliseconds.
    pub timeout_ms: Option<i64>,
    pub span: Span,
}

/// MATCH followed by mutations (compound statement).
/// E.g., `MATCH a: T, b: U WHERE ... LINK edge(a, b)`
#[derive(Debug, Clone, PartialEq)]
pub struct MatchMutateStmt {
    pub pattern: Vec<PatternElem>,
    pub where_clause: Option<Expr>,
    pub mutations: Vec<MutationAction>,
    pub span: Span,
}

/// MATCH followed by WALK (compound statement).
#[derive(Debug, Clone, PartialEq)]
pub struct MatchWalkStmt {
    pub pattern: Vec<PatternElem>,
    pub where_clause: Option<Expr>,
    pub walk: WalkStmt,
    pub span: Span,
}

/// A mutation action within a compound statement or a rule production.
#[derive(Debug, Clone, PartialEq)]
pub enum MutationAction {
    Spawn(SpawnStmt),
    Link(LinkStmt),
    Set(SetStmt),
    Kill(KillStmt),
    Unlink(UnlinkStmt),
}

/// An element in a pattern (node or edge pattern).
#[derive(Debug, Clone, PartialEq)]
pub enum PatternElem {
    Node(NodePattern),
    Edge(EdgePattern),
}

/// Node pattern: `var: Type`. The type may be `any`.
#[derive(Debug, Clone, PartialEq)]
pub struct NodePattern {
    pub var: String,
    pub type_name: String,
    pub span: Span,
}

/// Edge pattern: `edge_type(targets) AS alias`, transitive with `+`/`*` and
/// optional depth bounds `+{1,5}`, negated with a leading `!`.
///
/// Targets are variable names; `_` is the anonymous target that binds
/// nothing and accepts anything.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgePattern {
    pub edge_type: String,
    pub targets: Vec<String>,
    pub alias: Option<String>,
    pub transitive: Option<TransitiveMod>,
    pub negated: bool,
    pub span: Span,
}

/// Transitive edge pattern modifier with optional depth bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitiveMod {
    pub kind: TransitiveKind,
    pub min_depth: Option<i64>,
    pub max_depth: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitiveKind {
    /// `+` — one or more hops.
    Plus,
    /// `*` — zero or more hops.
    Star,
}

/// A pattern with elements and an optional WHERE clause.
/// Used in constraints and rules.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    pub elements: Vec<PatternElem>,
    pub where_clause: Option<Expr>,
    pub span: Span,
}

/// RETURN clause.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub distinct: bool,
    pub projections: Vec<Projection>,
    pub span: Span,
}

/// A projection in RETURN.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub expr: Expr,
    pub alias: Option<String>,
    pub span: Span,
}

/// ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderTerm {
    pub expr: Expr,
    pub direction: OrderDirection,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

// ==================== SPAWN ====================

/// SPAWN statement. Supports chained items: `SPAWN a: T {..}, b: U {..}`.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnStmt {
    pub items: Vec<SpawnItem>,
    pub returning: Option<ReturningClause>,
    pub span: Span,
}

impl SpawnStmt {
    /// Variable of the first item (the canonical binding for single spawns).
    pub fn var(&self) -> &str {
        &self.items[0].var
    }
}

/// A single node to create.
#[derive(Debug, Clone, PartialEq)]
pub struct SpawnItem {
    pub var: String,
    pub type_name: String,
    pub attrs: Vec<AttrAssignment>,
    pub span: Span,
}

/// Attribute assignment: `name = value`.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrAssignment {
    pub name: String,
    pub value: Expr,
    pub span: Span,
}

/// RETURNING clause.
#[derive(Debug, Clone, PartialEq)]
pub enum ReturningClause {
    Id,
    All,
    Fields(Vec<String>),
}

// ==================== KILL ====================

/// KILL statement for deleting nodes.
#[derive(Debug, Clone, PartialEq)]
pub struct KillStmt {
    pub target: Target,
    pub override_: Option<KillOverride>,
    pub returning: Option<ReturningClause>,
    pub span: Span,
}

/// Cascade override on KILL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KillOverride {
    /// Force cascading through `prevent` positions.
    Cascade,
    /// Fail if any incident edge exists.
    Restrict,
}

/// Target for KILL/SET/UNLINK operations.
#[derive(Debug, Clone, PartialEq)]
pub enum Target {
    Var(String),
    /// `#id` reference (raw digits, without the `#`).
    Id(String),
    /// Deduplicated result of a subquery.
    Pattern(Box<MatchStmt>),
    /// Edge identified by endpoints: `edge_type(a, b)`. Used by UNLINK.
    EdgePattern {
        edge_type: String,
        targets: Vec<String>,
    },
}

// ==================== LINK ====================

/// LINK statement for creating edges.
#[derive(Debug, Clone, PartialEq)]
pub struct LinkStmt {
    pub var: Option<String>,
    pub edge_type: String,
    pub targets: Vec<TargetRef>,
    pub attrs: Vec<AttrAssignment>,
    pub if_not_exists: bool,
    pub returning: Option<ReturningClause>,
    pub span: Span,
}

/// Target reference for LINK.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetRef {
    Var(String),
    Id(String),
    /// Inline `SPAWN var: Type { .. }` evaluated left-to-right.
    InlineSpawn(SpawnItem),
}

// ==================== UNLINK ====================

/// UNLINK statement for deleting edges.
#[derive(Debug, Clone, PartialEq)]
pub struct UnlinkStmt {
    pub target: Target,
    pub returning: Option<ReturningClause>,
    pub span: Span,
}

// ==================== SET ====================

/// SET statement for modifying attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub target: Target,
    pub assignments: Vec<AttrAssignment>,
    pub returning: Option<ReturningClause>,
    pub span: Span,
}

// ==================== WALK ====================

/// WALK statement for procedural traversal.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkStmt {
    pub from: Expr,
    pub follow: Vec<FollowClause>,
    pub until: Option<Expr>,
    pub return_type: WalkReturnType,
    pub span: Span,
}

/// FOLLOW clause in WALK. Edge type `*` means every edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowClause {
    pub edge_types: Vec<String>,
    pub direction: WalkDirection,
    pub min_depth: Option<i64>,
    pub max_depth: Option<i64>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WalkDirection {
    #[default]
    Outbound,
    Inbound,
    Any,
}

#[derive(Debug, Clone, PartialEq)]
pub enum WalkReturnType {
    Path { alias: Option<String> },
    Nodes { alias: Option<String> },
    Edges { alias: Option<String> },
    Terminal { alias: Option<String> },
}

// ==================== INSPECT ====================

/// INSPECT statement: direct entity lookup by id. Never raises on a
/// missing id; the executor answers `found = false` instead.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectStmt {
    /// The id without the `#` prefix.
    pub id: String,
    pub span: Span,
}

// ==================== TRANSACTION ====================

/// Transaction control statement.
#[derive(Debug, Clone, PartialEq)]
pub enum TxnStmt {
    Begin { isolation: Option<IsolationLevel> },
    Commit,
    Rollback,
    Savepoint(String),
    RollbackTo(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IsolationLevel {
    #[default]
    ReadCommitted,
    Serializable,
}

// ==================== ADMIN ====================

/// SHOW meta-query.
#[derive(Debug, Clone, PartialEq)]
pub struct ShowStmt {
    pub kind: ShowKind,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShowKind {
    Types,
    Edges,
    Constraints,
    Rules,
    Indexes,
    Statistics,
    Status,
}

/// CREATE INDEX / DROP INDEX on `Type(attr)`.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStmt {
    pub type_name: String,
    pub attr: String,
    pub span: Span,
}

/// LOAD ONTOLOGY / EXTEND ONTOLOGY with an inline declaration block.
#[derive(Debug, Clone, PartialEq)]
pub struct OntologyStmt {
    pub extend: bool,
    pub items: Vec<OntologyItem>,
    pub span: Span,
}

/// EXPLAIN wraps a statement and returns its plan instead of executing it.
#[derive(Debug, Clone, PartialEq)]
pub struct ExplainStmt {
    pub statement: Box<Stmt>,
    pub span: Span,
}

/// PROFILE executes a statement and reports its result with timings.
#[derive(Debug, Clone, PartialEq)]
pub struct ProfileStmt {
    pub statement: Box<Stmt>,
    pub span: Span,
}

/// DRY RUN executes a transformation in a transaction that always rolls
/// back, reporting the counts it would have produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DryRunStmt {
    pub statement: Box<Stmt>,
    pub span: Span,
}

/// Versioning statements parse but are rejected by this build.
#[derive(Debug, Clone, PartialEq)]
pub struct VersioningStmt {
    pub kind: VersioningKind,
    pub name: Option<String>,
    pub span: Span,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersioningKind {
    Snapshot,
    Checkout,
    Diff,
    Branch,
    Merge,
}

// ==================== EXPRESSIONS ====================

/// Expression types. Precedence: `or < and < eq < cmp < add < mul < unary < postfix`.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    Var(String, Span),
    /// Attribute access: `var.attr`.
    AttrAccess(Box<Expr>, String, Span),
    BinaryOp(BinaryOp, Box<Expr>, Box<Expr>, Span),
    UnaryOp(UnaryOp, Box<Expr>, Span),
    FnCall(FnCall),
    /// `#id` reference.
    IdRef(String, Span),
    /// `$param` reference.
    Param(String, Span),
    /// EXISTS subpattern; boolean-valued, exports no bindings.
    Exists(Vec<PatternElem>, Option<Box<Expr>>, Span),
    /// NOT EXISTS subpattern.
    NotExists(Vec<PatternElem>, Option<Box<Expr>>, Span),
    /// List literal: `[a, b, c]`.
    List(Vec<Expr>, Span),
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Literal(lit) => lit.span,
            Expr::Var(_, span) => *span,
            Expr::AttrAccess(_, _, span) => *span,
            Expr::BinaryOp(_, _, _, span) => *span,
            Expr::UnaryOp(_, _, span) => *span,
            Expr::FnCall(fc) => fc.span,
            Expr::IdRef(_, span) => *span,
            Expr::Param(_, span) => *span,
            Expr::Exists(_, _, span) => *span,
            Expr::NotExists(_, _, span) => *span,
            Expr::List(_, span) => *span,
        }
    }
}

/// Literal values.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    pub kind: LiteralKind,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LiteralKind {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    /// Duration in milliseconds.
    Duration(i64),
    /// Timestamp as milliseconds since Unix epoch.
    Timestamp(i64),
}

impl fmt::Display for LiteralKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralKind::Null => write!(f, "null"),
            LiteralKind::Bool(b) => write!(f, "{}", b),
            LiteralKind::Int(i) => write!(f, "{}", i),
            LiteralKind::Float(fl) => write!(f, "{}", fl),
            LiteralKind::String(s) => write!(f, "\"{}\"", s),
            LiteralKind::Duration(ms) => write!(f, "{}ms", ms),
            LiteralKind::Timestamp(ms) => write!(f, "@{}", ms),
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    /// `++` string concatenation.
    Concat,
    /// `??` null coalescing.
    NullCoalesce,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Mod => "%",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Concat => "++",
            BinaryOp::NullCoalesce => "??",
        };
        write!(f, "{}", s)
    }
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

/// Function call.
#[derive(Debug, Clone, PartialEq)]
pub struct FnCall {
    pub name: String,
    pub args: Vec<Expr>,
    /// For `count(DISTINCT ...)` style calls.
    pub distinct: bool,
    pub span: Span,
}

// ==================== ONTOLOGY ====================

/// Top-level ontology declaration.
#[derive(Debug, Clone, PartialEq)]
pub enum OntologyItem {
    Node(NodeTypeDecl),
    Edge(EdgeTypeDecl),
    Constraint(ConstraintDecl),
    Rule(RuleDecl),
}

/// Node type declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTypeDecl {
    pub name: String,
    pub parents: Vec<String>,
    pub is_abstract: bool,
    pub attrs: Vec<AttrDecl>,
    pub span: Span,
}

/// Attribute declaration within a node or edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrDecl {
    pub name: String,
    pub type_name: String,
    /// `Type?` — value may be null.
    pub nullable: bool,
    pub modifiers: Vec<AttrModifier>,
    pub span: Span,
}

/// Attribute modifier.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrModifier {
    Required,
    Unique,
    Indexed,
    Default(Expr),
    Range {
        min: Option<Expr>,
        max: Option<Expr>,
    },
    /// `in: ["a", "b"]` — allowed values.
    InValues(Vec<Expr>),
    /// `match: "regex"` — pattern validation.
    Match(String),
    /// `length: N..M` — string length constraint.
    Length { min: i64, max: i64 },
    /// `format: email` — built-in format validation.
    Format(String),
}

/// Edge type declaration.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTypeDecl {
    pub name: String,
    /// Positional parameters: `(name, type-spec)`. A type spec is a node
    /// type name, `any`, `edge<any>`, or `edge<some_edge_type>`.
    pub params: Vec<(String, String)>,
    pub attrs: Vec<AttrDecl>,
    pub modifiers: Vec<EdgeModifier>,
    pub span: Span,
}

/// Edge modifier.
#[derive(Debug, Clone, PartialEq)]
pub enum EdgeModifier {
    Acyclic,
    Unique,
    NoSelf,
    Symmetric,
    OnKill {
        position: OnKillPosition,
        action: ReferentialAction,
    },
    /// `cardinality param: min..max` — `*` for unbounded max.
    Cardinality {
        param: String,
        min: i64,
        max: Option<i64>,
    },
}

/// Which position of a binary edge an on-kill policy names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnKillPosition {
    Source,
    Target,
}

/// Referential action taken when a node in an edge position is killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReferentialAction {
    Cascade,
    Unlink,
    Prevent,
}

/// Constraint declaration: `constraint Name [mods]: Pattern => Condition`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstraintDecl {
    pub name: String,
    pub pattern: Pattern,
    pub condition: Expr,
    pub soft: bool,
    pub deferred: bool,
    pub message: Option<String>,
    pub span: Span,
}

/// Rule declaration: `rule Name [mods]: Pattern => Production`.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleDecl {
    pub name: String,
    pub pattern: Pattern,
    pub auto: bool,
    pub priority: Option<i64>,
    pub production: Vec<MutationAction>,
    pub span: Span,
}
