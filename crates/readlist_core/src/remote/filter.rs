use core::fmt;

/// Filter expression understood by the hosted backend's list endpoint.
///
/// Values are always quoted and escaped on rendering, so callers never interpolate raw user input
/// into the expression string.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Filter {
    /// `field = "value"`
    Equals(String, String),
    /// `field ~ "value"`, a case-insensitive substring match
    Contains(String, String),
    /// `left && right`
    And(Box<Filter>, Box<Filter>),
    /// `left || right`
    Or(Box<Filter>, Box<Filter>),
}

impl Filter {
    #[must_use]
    #[inline]
    pub fn equals(field: &str, value: &str) -> Self {
        Self::Equals(field.to_owned(), value.to_owned())
    }

    #[must_use]
    #[inline]
    pub fn contains(field: &str, value: &str) -> Self {
        Self::Contains(field.to_owned(), value.to_owned())
    }

    #[must_use]
    #[inline]
    pub fn and(self, other: Self) -> Self {
        Self::And(Box::new(self), Box::new(other))
    }

    #[must_use]
    #[inline]
    pub fn or(self, other: Self) -> Self {
        Self::Or(Box::new(self), Box::new(other))
    }

    const fn is_compound(&self) -> bool {
        matches!(self, Self::And(..) | Self::Or(..))
    }

    fn write_operand(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_compound() {
            write!(formatter, "({self})")
        } else {
            write!(formatter, "{self}")
        }
    }
}

#[allow(clippy::missing_inline_in_public_items, reason = "Called rarely")]
impl fmt::Display for Filter {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(field, value) => write!(formatter, "{field} = \"{}\"", escape(value)),
            Self::Contains(field, value) => write!(formatter, "{field} ~ \"{}\"", escape(value)),
            Self::And(left, right) => {
                left.write_operand(formatter)?;
                formatter.write_str(" && ")?;
                right.write_operand(formatter)
            }
            Self::Or(left, right) => {
                left.write_operand(formatter)?;
                formatter.write_str(" || ")?;
                right.write_operand(formatter)
            }
        }
    }
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn renders_reading_list_lookup() {
        let filter = Filter::equals("user", "u1").and(Filter::equals("book", "book-7"));
        assert_eq!(filter.to_string(), r#"user = "u1" && book = "book-7""#);
    }

    #[test]
    fn renders_search_disjunction() {
        let filter = Filter::contains("title", "dune").or(Filter::contains("author", "dune"));
        assert_eq!(filter.to_string(), r#"title ~ "dune" || author ~ "dune""#);
    }

    #[test]
    fn parenthesizes_nested_operands() {
        let filter = Filter::equals("type", "fiction")
            .and(Filter::contains("title", "a").or(Filter::contains("author", "a")));
        assert_eq!(
            filter.to_string(),
            r#"type = "fiction" && (title ~ "a" || author ~ "a")"#
        );
    }

    #[test]
    fn escapes_quotes_in_values() {
        let filter = Filter::contains("title", r#"the "best" \ book"#);
        assert_eq!(filter.to_string(), r#"title ~ "the \"best\" \\ book""#);
    }
}
