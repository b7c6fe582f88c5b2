use core::fmt;
use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::error::{Result, SolverError};

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaType {
    Boolean,
    Integer,
    Rational,
    Bitvector(u32),
    FloatingPoint { exponent: u32, mantissa: u32 },
    Array(Box<FormulaType>, Box<FormulaType>),
}

impl FormulaType {
    pub fn array(index: FormulaType, element: FormulaType) -> Self {
        FormulaType::Array(Box::new(index), Box::new(element))
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self, FormulaType::Boolean)
    }

    pub fn is_numeral(&self) -> bool {
        matches!(self, FormulaType::Integer | FormulaType::Rational)
    }

    pub fn try_get_bv_size(&self) -> Option<u32> {
        match self {
            FormulaType::Bitvector(width) => Some(*width),
            _ => None,
        }
    }

    pub fn try_get_array_types(&self) -> Option<(&FormulaType, &FormulaType)> {
        match self {
            FormulaType::Array(index, element) => Some((index, element)),
            _ => None,
        }
    }

    /// Whether a handle of sort `actual` may be wrapped as a value of this type.
    /// Integer handles may be widened into rationals, nothing else is converted.
    pub fn accepts(&self, actual: &FormulaType) -> bool {
        self == actual || (*self == FormulaType::Rational && *actual == FormulaType::Integer)
    }
}

impl fmt::Display for FormulaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormulaType::Boolean => write!(f, "Boolean"),
            FormulaType::Integer => write!(f, "Integer"),
            FormulaType::Rational => write!(f, "Rational"),
            FormulaType::Bitvector(width) => write!(f, "Bitvector<{}>", width),
            FormulaType::FloatingPoint { exponent, mantissa } => {
                write!(f, "FloatingPoint<{}, {}>", exponent, mantissa)
            }
            FormulaType::Array(index, element) => write!(f, "Array<{}, {}>", index, element),
        }
    }
}

/// Identity of one solver environment. Every value remembers the environment
/// that created it so that it cannot leak into another one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EnvId(u64);

impl EnvId {
    pub(crate) fn fresh() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        EnvId(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

/// A typed wrapper around one native term handle.
#[derive(Clone)]
pub struct Formula<T> {
    term: T,
    formula_type: FormulaType,
    owner: EnvId,
    // Keeps the registration in the creator's cleanup queue alive.
    liveness: Option<Rc<()>>,
}

impl<T> Formula<T> {
    pub(crate) fn new(
        term: T,
        formula_type: FormulaType,
        owner: EnvId,
        liveness: Option<Rc<()>>,
    ) -> Self {
        Self {
            term,
            formula_type,
            owner,
            liveness,
        }
    }

    pub fn formula_type(&self) -> &FormulaType {
        &self.formula_type
    }

    pub fn owner(&self) -> EnvId {
        self.owner
    }

    pub(crate) fn term(&self) -> &T {
        &self.term
    }

    pub(crate) fn is_tracked(&self) -> bool {
        self.liveness.is_some()
    }
}

impl<T: PartialEq> PartialEq for Formula<T> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner && self.term == other.term
    }
}

impl<T: Eq> Eq for Formula<T> {}

impl<T: Hash> Hash for Formula<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.term.hash(state);
    }
}

impl<T: fmt::Debug> fmt::Debug for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("term", &self.term)
            .field("type", &self.formula_type)
            .finish()
    }
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
pub struct BooleanFormula<T>(Formula<T>);

impl<T> BooleanFormula<T> {
    pub fn as_formula(&self) -> &Formula<T> {
        &self.0
    }

    pub fn into_formula(self) -> Formula<T> {
        self.0
    }

    pub fn owner(&self) -> EnvId {
        self.0.owner
    }

    pub(crate) fn term(&self) -> &T {
        &self.0.term
    }
}

impl<T> From<BooleanFormula<T>> for Formula<T> {
    fn from(value: BooleanFormula<T>) -> Self {
        value.0
    }
}

impl<T> TryFrom<Formula<T>> for BooleanFormula<T> {
    type Error = SolverError;

    fn try_from(value: Formula<T>) -> Result<Self> {
        if value.formula_type.is_boolean() {
            Ok(BooleanFormula(value))
        } else {
            Err(SolverError::type_mismatch(
                &FormulaType::Boolean,
                &value.formula_type,
            ))
        }
    }
}

/// An uninterpreted function symbol. Two declarations with the same name and
/// signature in the same environment are equal.
#[derive(Clone, Debug)]
pub struct FunctionDeclaration<D> {
    name: String,
    argument_types: Vec<FormulaType>,
    return_type: FormulaType,
    decl: D,
    owner: EnvId,
}

impl<D> FunctionDeclaration<D> {
    pub(crate) fn new(
        name: &str,
        argument_types: Vec<FormulaType>,
        return_type: FormulaType,
        decl: D,
        owner: EnvId,
    ) -> Self {
        Self {
            name: name.to_string(),
            argument_types,
            return_type,
            decl,
            owner,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn argument_types(&self) -> &[FormulaType] {
        &self.argument_types
    }

    pub fn return_type(&self) -> &FormulaType {
        &self.return_type
    }

    pub fn owner(&self) -> EnvId {
        self.owner
    }

    pub(crate) fn decl(&self) -> &D {
        &self.decl
    }
}

impl<D> PartialEq for FunctionDeclaration<D> {
    fn eq(&self, other: &Self) -> bool {
        self.owner == other.owner
            && self.name == other.name
            && self.argument_types == other.argument_types
            && self.return_type == other.return_type
    }
}

impl<D> Eq for FunctionDeclaration<D> {}

impl<D> Hash for FunctionDeclaration<D> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.owner.hash(state);
        self.name.hash(state);
        self.argument_types.hash(state);
        self.return_type.hash(state);
    }
}

/// A declaration the native session has to know about.
/// `Numeric` covers constants of every non-boolean sort.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Symbol<T, D> {
    Boolean(T),
    Numeric(T),
    Function(D),
}
