#[macro_export]
macro_rules! regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).unwrap());
        &*RE
    }};
}

/// Reference to another rule of the grammar by name.
#[macro_export]
macro_rules! nt {
    ($name:expr) => {
        $crate::Item::Rule(::std::string::String::from($name))
    };
}

/// Anonymous literal terminal, e.g. `lit!("+")`.
#[macro_export]
macro_rules! lit {
    ($text:expr) => {
        $crate::Item::Literal(::std::string::String::from($text))
    };
}

/// Anonymous regular-expression terminal, e.g. `pat!("[a-z]+")`.
#[macro_export]
macro_rules! pat {
    ($pattern:expr) => {
        $crate::Item::Pattern(::std::string::String::from($pattern))
    };
}
