use crate::language::TypeHierarchy;

/// Matches any argument type, including one the host could not determine.
pub const ANY_TYPE: &str = "*";

/// Type constraint for a receiver or an argument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeMatcher {
    names: Vec<String>,
    exact: bool,
}

impl TypeMatcher {
    pub fn subtypes_of<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            exact: false,
        }
    }

    pub fn exactly<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            names: names.into_iter().map(Into::into).collect(),
            exact: true,
        }
    }

    pub fn any() -> Self {
        Self::subtypes_of([ANY_TYPE])
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn is_exact(&self) -> bool {
        self.exact
    }

    pub fn set_exact(&mut self, exact: bool) {
        self.exact = exact;
    }

    pub fn is_wildcard(&self) -> bool {
        self.names.iter().any(|name| name == ANY_TYPE)
    }

    /// An unknown actual type matches only the wildcard.
    pub fn matches(&self, hierarchy: &dyn TypeHierarchy, actual: Option<&str>) -> bool {
        if self.is_wildcard() {
            return true;
        }
        let Some(actual) = actual else {
            return false;
        };
        self.names.iter().any(|expected| {
            expected == actual || (!self.exact && hierarchy.is_subtype_of(actual, expected))
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberMatcher {
    Methods(Vec<String>),
    Constructor,
}

impl MemberMatcher {
    pub fn matches(&self, method_name: Option<&str>, is_constructor: bool) -> bool {
        match self {
            MemberMatcher::Constructor => is_constructor,
            MemberMatcher::Methods(names) => {
                !is_constructor
                    && method_name.is_some_and(|name| names.iter().any(|n| n == name))
            }
        }
    }
}
