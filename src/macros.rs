/// Compile a regex literal once and hand out a `&'static Regex`.
///
/// The literal is fixed at compile time, so a failure to build it is a
/// programming error caught by the first test that touches the call site.
#[macro_export]
macro_rules! static_regex {
    ($pat:literal) => {{
        static RE: once_cell::sync::Lazy<regex::Regex> =
            once_cell::sync::Lazy::new(|| regex::Regex::new($pat).expect(concat!("invalid static regex: ", $pat)));
        &*RE
    }};
}
