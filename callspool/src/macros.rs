/// Builds the [`CallSite`](crate::CallSite) of the code the macro is invoked in.
///
/// Without arguments the enclosing function is named, with a closure's `{{closure}}` segments
/// removed. With a string the unit is named explicitly and the scope is the current module.
///
/// # Examples
///
/// ```rust
/// use callspool::call_site;
///
/// fn checkout() -> callspool::CallSite {
///     call_site!()
/// }
///
/// assert_eq!(checkout().unit(), "checkout");
///
/// let site = call_site!("refund");
/// assert_eq!(site.unit(), "refund");
/// assert_eq!(site.scope(), module_path!());
/// ```
#[macro_export]
macro_rules! call_site {
    () => {{
        fn __callspool_marker() {}
        $crate::CallSite::from_function_path($crate::macro_helpers::strip_marker(
            ::core::any::type_name_of_val(&__callspool_marker),
        ))
    }};
    ($unit:expr $(,)?) => {
        $crate::CallSite::new(::core::module_path!(), $unit)
    };
}
