//! Integer expressions, branch predicates and their linear normal form.

use std::collections::BTreeMap;
use std::fmt;

/// A program variable, local to its function.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Var(pub String);

impl Var {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn name(&self) -> &str {
        &self.0
    }
}

impl From<&str> for Var {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Var {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Integer expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(i64),
    Var(Var),
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Neg(Box<Expr>),
}

impl Expr {
    pub fn var(var: impl Into<Var>) -> Self {
        Expr::Var(var.into())
    }

    pub fn constant(value: i64) -> Self {
        Expr::Const(value)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: Self) -> Self {
        Expr::Add(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn sub(self, other: Self) -> Self {
        Expr::Sub(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn mul(self, other: Self) -> Self {
        Expr::Mul(Box::new(self), Box::new(other))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn neg(self) -> Self {
        Expr::Neg(Box::new(self))
    }

    /// `var + offset`, the shape produced by front ends for `a + 2` / `a - 2`.
    pub fn offset(var: impl Into<Var>, offset: i64) -> Self {
        match offset {
            0 => Expr::var(var),
            k if k > 0 => Expr::var(var).add(Expr::constant(k)),
            k => Expr::var(var).sub(Expr::constant(k.saturating_neg())),
        }
    }

    pub fn gt(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Gt, other)
    }

    pub fn ge(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Ge, other)
    }

    pub fn lt(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Lt, other)
    }

    pub fn le(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Le, other)
    }

    pub fn eq(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Eq, other)
    }

    pub fn ne(self, other: Self) -> Predicate {
        Predicate::new(self, CompareOp::Ne, other)
    }

    /// Variables mentioned by the expression.
    pub fn vars(&self) -> Vec<&Var> {
        let mut out = Vec::new();
        self.collect_vars(&mut out);
        out
    }

    fn collect_vars<'a>(&'a self, out: &mut Vec<&'a Var>) {
        match self {
            Expr::Const(_) => {}
            Expr::Var(v) => out.push(v),
            Expr::Add(a, b) | Expr::Sub(a, b) | Expr::Mul(a, b) => {
                a.collect_vars(out);
                b.collect_vars(out);
            }
            Expr::Neg(a) => a.collect_vars(out),
        }
    }

    /// Linear normal form, if the expression is linear and fits in `i64`.
    pub fn linearize(&self) -> Option<Linear> {
        match self {
            Expr::Const(c) => Some(Linear::constant(*c)),
            Expr::Var(v) => Some(Linear::var(v.clone())),
            Expr::Add(a, b) => a.linearize()?.plus(&b.linearize()?),
            Expr::Sub(a, b) => a.linearize()?.plus(&b.linearize()?.scale(-1)?),
            Expr::Neg(a) => a.linearize()?.scale(-1),
            Expr::Mul(a, b) => {
                let (a, b) = (a.linearize()?, b.linearize()?);
                if let Some(k) = a.as_constant() {
                    b.scale(k)
                } else if let Some(k) = b.as_constant() {
                    a.scale(k)
                } else {
                    None
                }
            }
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(c) => write!(f, "{}", c),
            Expr::Var(v) => write!(f, "{}", v),
            Expr::Add(a, b) => write!(f, "({} + {})", a, b),
            Expr::Sub(a, b) => write!(f, "({} - {})", a, b),
            Expr::Mul(a, b) => write!(f, "({} * {})", a, b),
            Expr::Neg(a) => write!(f, "-{}", a),
        }
    }
}

/// `Σ coefᵢ·varᵢ + constant`, with no zero coefficients.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Linear {
    pub terms: BTreeMap<Var, i64>,
    pub constant: i64,
}

impl Linear {
    pub fn constant(c: i64) -> Self {
        Self {
            terms: BTreeMap::new(),
            constant: c,
        }
    }

    pub fn var(v: Var) -> Self {
        Self {
            terms: BTreeMap::from([(v, 1)]),
            constant: 0,
        }
    }

    pub fn as_constant(&self) -> Option<i64> {
        self.terms.is_empty().then_some(self.constant)
    }

    /// `var + k` with unit coefficient.
    pub fn as_offset(&self) -> Option<(&Var, i64)> {
        match self.terms.iter().next() {
            Some((v, 1)) if self.terms.len() == 1 => Some((v, self.constant)),
            _ => None,
        }
    }

    /// Add `coef·var`, dropping the term if it cancels.
    pub fn add_term(&mut self, var: Var, coef: i64) -> Option<()> {
        let entry = self.terms.entry(var).or_insert(0);
        *entry = entry.checked_add(coef)?;
        self.terms.retain(|_, c| *c != 0);
        Some(())
    }

    pub fn plus(mut self, other: &Linear) -> Option<Self> {
        for (v, c) in &other.terms {
            self.add_term(v.clone(), *c)?;
        }
        self.constant = self.constant.checked_add(other.constant)?;
        Some(self)
    }

    pub fn scale(mut self, k: i64) -> Option<Self> {
        if k == 0 {
            return Some(Self::constant(0));
        }
        for c in self.terms.values_mut() {
            *c = c.checked_mul(k)?;
        }
        self.constant = self.constant.checked_mul(k)?;
        Some(self)
    }
}

/// Comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompareOp {
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl CompareOp {
    /// The operator of the logical negation: `¬(a < b) ≡ a >= b`.
    pub fn negate(self) -> Self {
        match self {
            CompareOp::Lt => CompareOp::Ge,
            CompareOp::Le => CompareOp::Gt,
            CompareOp::Gt => CompareOp::Le,
            CompareOp::Ge => CompareOp::Lt,
            CompareOp::Eq => CompareOp::Ne,
            CompareOp::Ne => CompareOp::Eq,
        }
    }

    /// Evaluate on concrete values.
    pub fn holds(self, lhs: i64, rhs: i64) -> bool {
        match self {
            CompareOp::Lt => lhs < rhs,
            CompareOp::Le => lhs <= rhs,
            CompareOp::Gt => lhs > rhs,
            CompareOp::Ge => lhs >= rhs,
            CompareOp::Eq => lhs == rhs,
            CompareOp::Ne => lhs != rhs,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
            CompareOp::Eq => "==",
            CompareOp::Ne => "!=",
        };
        write!(f, "{}", s)
    }
}

/// Branch condition `lhs op rhs`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Predicate {
    pub lhs: Expr,
    pub op: CompareOp,
    pub rhs: Expr,
}

impl Predicate {
    pub fn new(lhs: Expr, op: CompareOp, rhs: Expr) -> Self {
        Self { lhs, op, rhs }
    }

    pub fn negate(&self) -> Self {
        Self {
            lhs: self.lhs.clone(),
            op: self.op.negate(),
            rhs: self.rhs.clone(),
        }
    }
}

impl fmt::Display for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.lhs, self.op, self.rhs)
    }
}

#[cfg(test)]
mod tests {
    use test_log::test;

    use super::*;

    #[test]
    fn test_linearize() {
        // 2*(a + 3) - b - a
        let e = Expr::constant(2)
            .mul(Expr::var("a").add(Expr::constant(3)))
            .sub(Expr::var("b"))
            .sub(Expr::var("a"));
        let lin = e.linearize().unwrap();
        assert_eq!(lin.terms.get(&Var::new("a")), Some(&1));
        assert_eq!(lin.terms.get(&Var::new("b")), Some(&-1));
        assert_eq!(lin.constant, 6);
    }

    #[test]
    fn test_linearize_cancels() {
        let e = Expr::var("a").sub(Expr::var("a")).add(Expr::constant(4));
        assert_eq!(e.linearize().unwrap().as_constant(), Some(4));
    }

    #[test]
    fn test_nonlinear() {
        assert!(Expr::var("a").mul(Expr::var("b")).linearize().is_none());
    }

    #[test]
    fn test_offset() {
        let lin = Expr::offset("a", -2).linearize().unwrap();
        assert_eq!(lin.as_offset(), Some((&Var::new("a"), -2)));
        assert_eq!(Expr::offset("a", 0), Expr::var("a"));
        assert!(Expr::var("a").neg().linearize().unwrap().as_offset().is_none());
    }

    #[test]
    fn test_negate() {
        let p = Expr::var("a").gt(Expr::var("b"));
        assert_eq!(p.negate().op, CompareOp::Le);
        assert_eq!(p.negate().negate(), p);
        assert_eq!(p.to_string(), "a > b");
        for op in [CompareOp::Lt, CompareOp::Le, CompareOp::Gt, CompareOp::Ge, CompareOp::Eq, CompareOp::Ne] {
            for (l, r) in [(1, 2), (2, 2), (3, 2)] {
                assert_ne!(op.holds(l, r), op.negate().holds(l, r));
            }
        }
    }
}
