/// Build a `PathBuf` out of a list of components, same shape as `std::path::Path::join`
/// chained repeatedly but without the intermediate allocations reading awkwardly at call
/// sites.
#[macro_export]
macro_rules! makepath {
    ($( $part:expr ),+ $(,)?) => {{
        let mut p = ::std::path::PathBuf::new();
        $( p.push($part); )+
        p
    }};
}
