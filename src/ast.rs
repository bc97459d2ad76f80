//! Typed tree produced by the parser (spec.md §4.B). Lowered into callable
//! closures by [`crate::compiler`]; never executed by walking the tree
//! directly.

use crate::types::StreamId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

/// A unit-bearing or plain redirection target: `for <app> of <subs>`.
#[derive(Debug, Clone, PartialEq)]
pub struct Rescope {
    pub application: Option<String>,
    pub substance: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    String(String),
    Identifier(String),
    /// A literal number with an attached unit, e.g. `10 kg`.
    UnitValue(Box<Expr>, String),
    Arith(ArithOp, Box<Expr>, Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    /// `if cond then a else b endif`; `else` branch optional.
    Conditional(Box<Expr>, Box<Expr>, Option<Box<Expr>>),
    GetStream {
        target: StreamId,
        rescope: Option<Rescope>,
        conversion: Option<String>,
    },
    LimitMin(Box<Expr>, Box<Expr>),
    LimitMax(Box<Expr>, Box<Expr>),
    LimitBound(Box<Expr>, Box<Expr>, Box<Expr>),
    SampleNormal {
        mean: Box<Expr>,
        std: Box<Expr>,
    },
    SampleUniform {
        low: Box<Expr>,
        high: Box<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum YearClause {
    All,
    SingleYear(Expr),
    Range(Expr, Expr),
    WithMin(Expr),
    WithMax(Expr),
    OnStart,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    DefineVar(String, Expr),
    SetStream {
        target: StreamId,
        value: Expr,
        years: YearClause,
    },
    ChangeStream {
        target: StreamId,
        delta: Expr,
        years: YearClause,
    },
    CapStream {
        target: StreamId,
        limit: Expr,
        years: YearClause,
    },
    FloorStream {
        target: StreamId,
        limit: Expr,
        years: YearClause,
    },
    InitialCharge {
        stream: StreamId,
        value: Expr,
        years: YearClause,
    },
    Recharge {
        population_pct: Expr,
        volume_per_unit: Expr,
        years: YearClause,
    },
    Retire {
        pct_per_year: Expr,
        years: YearClause,
    },
    Recycle {
        volume: Expr,
        yield_pct: Expr,
        displacement: Option<Displacement>,
        years: YearClause,
    },
    Replace {
        volume: Expr,
        stream: StreamId,
        destination_substance: String,
        years: YearClause,
    },
    Emit {
        value: Expr,
        years: YearClause,
    },
    /// `equals 1 tCO2e / kg` — declares GHG intensity for the current scope.
    Equals(Expr),
    /// `uses 2 kwh / kg` — declares energy intensity for the current scope.
    UsesEnergy(Expr),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplacementTarget {
    Manufacture,
    Import,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Displacement {
    pub target: DisplacementTarget,
    pub percent: Expr,
}

/// One `substance "name" { ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct SubstanceDef {
    pub name: String,
    pub statements: Vec<Statement>,
}

/// One `application "name" { substance ... }` block.
#[derive(Debug, Clone, PartialEq)]
pub struct ApplicationDef {
    pub name: String,
    pub substances: Vec<SubstanceDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Default {
    pub applications: Vec<ApplicationDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Policy {
    pub name: String,
    pub applications: Vec<ApplicationDef>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SimulationItem {
    pub name: String,
    pub stanzas: Vec<String>,
    pub start_year: Expr,
    pub end_year: Expr,
    pub trials: Expr,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Simulations {
    pub items: Vec<SimulationItem>,
}

/// A fully parsed QubecTalk program: the `about`, `default`, `policy`, and
/// `simulations` stanzas in source order (spec.md §6 "Program surface").
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ProgramAst {
    pub about_present: bool,
    pub default: Option<Default>,
    pub policies: Vec<Policy>,
    pub simulations: Option<Simulations>,
}
