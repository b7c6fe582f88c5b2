pub mod array;
pub mod bitvector;
pub mod boolean;
pub mod context;
pub mod creator;
pub mod dummy;
pub mod error;
pub mod generalized;
pub mod model;
pub mod numeral;
pub mod options;
pub mod quantifier;
pub mod shutdown;
pub mod stack;
pub mod term;
pub mod uf;
pub mod visitor;
#[cfg(feature = "z3")]
pub mod z3;

pub mod converters {
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
    pub enum Converter {
        Z3,
        Dummy,
    }

    impl Default for Converter {
        fn default() -> Self {
            if cfg!(feature = "z3") {
                Converter::Z3
            } else {
                Converter::Dummy
            }
        }
    }

    use crate::dummy::DummyFactory;
    #[cfg(feature = "z3")]
    use crate::z3::Z3Factory;

    #[cfg(feature = "z3")]
    pub fn mk_z3_factory() -> Z3Factory {
        Z3Factory::default()
    }

    pub fn mk_dummy_factory() -> DummyFactory {
        DummyFactory::default()
    }
}
