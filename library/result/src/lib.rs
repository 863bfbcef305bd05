use error::ChronosError;

/// A Result is an alias of [std::result::Result](std::result::Result) with its error variant
/// pre-populated with a `Box<dyn ChronosError>`. This allows for shorter
/// notation throughout the codebase.
///
/// For example, instead of writing...
///
/// ```
/// use error::ChronosError;
///
/// fn greet() -> Result<&'static str, Box<dyn ChronosError>> {
///     Ok("Hello, Chronos!")
/// }
/// ```
///
/// ...you can simply say...
///
/// ```
/// use error::ChronosError;
/// use result::Result;
///
/// fn greet() -> Result<&'static str> {
///     Ok("Hello, Chronos!")
/// }
/// ```
///
/// It also helps in easily identifying if any functions are returning errors
/// BEFORE converting them into project native [ChronosError](error::ChronosError)s.
pub type Result<T> = std::result::Result<T, Box<dyn ChronosError>>;
