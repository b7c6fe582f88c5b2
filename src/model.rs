use std::fmt;

use crate::creator::FormulaCreator;
use crate::error::Result;
use crate::generalized::{ConstantValue, GeneralConverter};
use crate::term::Formula;

/// One entry of a model: a free constant and the value the solver chose for it.
#[derive(Clone, Debug)]
pub struct ValueAssignment<T> {
    name: String,
    key: Formula<T>,
    value: Formula<T>,
    constant: Option<ConstantValue>,
}

impl<T> ValueAssignment<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn key(&self) -> &Formula<T> {
        &self.key
    }

    pub fn value(&self) -> &Formula<T> {
        &self.value
    }

    /// `None` for values without a literal form, e.g. arrays.
    pub fn constant(&self) -> Option<&ConstantValue> {
        self.constant.as_ref()
    }
}

/// Snapshot of a satisfying assignment. It stays valid after the stack changes.
#[derive(Clone, Debug)]
pub struct Model<T> {
    assignments: Vec<ValueAssignment<T>>,
}

pub type ModelOf<C> = Model<<C as GeneralConverter>::Term>;

impl<T> Model<T> {
    pub(crate) fn from_pairs<C>(creator: &FormulaCreator<C>, pairs: Vec<(T, T)>) -> Result<Self>
    where
        C: GeneralConverter<Term = T>,
    {
        let converter = creator.converter();
        let mut assignments = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            assignments.push(ValueAssignment {
                name: converter.symbol_name(&key)?,
                constant: converter.constant_value(&value)?,
                key: creator.encapsulate_with_type_of(key)?,
                value: creator.encapsulate_with_type_of(value)?,
            });
        }
        assignments.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(Self { assignments })
    }

    pub fn assignments(&self) -> &[ValueAssignment<T>] {
        &self.assignments
    }

    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&ValueAssignment<T>> {
        self.assignments.iter().find(|assignment| assignment.name == name)
    }

    pub fn value_of(&self, key: &Formula<T>) -> Option<&Formula<T>>
    where
        T: PartialEq,
    {
        self.assignments
            .iter()
            .find(|assignment| assignment.key == *key)
            .map(|assignment| &assignment.value)
    }
}

impl<T> fmt::Display for Model<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for assignment in &self.assignments {
            match &assignment.constant {
                Some(value) => writeln!(f, "{} = {}", assignment.name, value)?,
                None => writeln!(f, "{} = ?", assignment.name)?,
            }
        }
        Ok(())
    }
}

impl fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstantValue::Bool(value) => write!(f, "{}", value),
            ConstantValue::Integer(value) => write!(f, "{}", value),
            ConstantValue::Rational(value) => write!(f, "{}", value),
            ConstantValue::Decimal(value) => write!(f, "{}", value),
            ConstantValue::Bitvector { value, width } => {
                write!(f, "#b{:0>1$}", value.to_str_radix(2), *width as usize)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dummy::{DummyContext, DummySolver};
    use crate::generalized::{GeneralSolver, SolverResult};
    use crate::options::Options;
    use crate::term::FormulaType;
    use num_bigint::BigInt;
    use std::rc::Rc;

    #[test]
    fn bitvector_literals_are_padded() {
        let value = ConstantValue::Bitvector {
            value: BigInt::from(5),
            width: 6,
        };
        assert_eq!(value.to_string(), "#b000101");
    }

    #[test]
    fn snapshot_is_sorted_by_name() {
        let context = Rc::new(DummyContext::new());
        let creator = FormulaCreator::new(context.clone(), &Options::default()).unwrap();
        let solver = DummySolver::new(context, &Options::default());
        creator.make_variable(&FormulaType::Bitvector(4), "b").unwrap();
        let a = creator.make_variable(&FormulaType::Integer, "a").unwrap();
        for symbol in creator.declared_symbols() {
            solver.declare(&symbol).unwrap();
        }
        assert_eq!(solver.check_sat().unwrap(), SolverResult::Sat);

        let model = Model::from_pairs(&creator, solver.model_assignments().unwrap()).unwrap();
        let names: Vec<_> = model.assignments().iter().map(|a| a.name()).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(
            model.get("b").and_then(|a| a.constant()),
            Some(&ConstantValue::Bitvector {
                value: BigInt::from(0),
                width: 4
            })
        );
        let a = creator.encapsulate_with_type_of(a).unwrap();
        assert!(model.value_of(&a).is_some());
        assert_eq!(model.to_string(), "a = 0\nb = #b0000\n");
    }
}
