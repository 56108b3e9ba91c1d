/// XPath/XQuery function namespace (`fn:`).
pub const FNS: &str = "http://www.w3.org/2005/xpath-functions";
/// XML Schema namespace (`xs:`).
pub const XS: &str = "http://www.w3.org/2001/XMLSchema";
/// Reserved `xml:` namespace.
pub const XML_URI: &str = "http://www.w3.org/XML/1998/namespace";
/// Error code namespace (`err:`).
pub const ERR_NS: &str = "http://www.w3.org/2005/xqt-errors";
/// Unicode codepoint collation, the only collation the engine supports.
pub const CODEPOINT_COLLATION: &str =
    "http://www.w3.org/2005/xpath-functions/collation/codepoint";
