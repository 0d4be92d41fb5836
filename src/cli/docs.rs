//! Documentation content for the selector CLI

use super::CliError;

/// Available documentation categories
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocCategory {
    Syntax,
    Operators,
    Functions,
    Models,
}

impl DocCategory {
    /// Parse category name from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "syntax" => Some(Self::Syntax),
            "operators" | "ops" => Some(Self::Operators),
            "functions" | "function" | "json" | "parse" => Some(Self::Functions),
            "models" | "model" | "ml" => Some(Self::Models),
            _ => None,
        }
    }
}

/// Get the docs overview (category listing)
pub fn get_docs_overview() -> &'static str {
    r#"SELECTOR DOCUMENTATION

A selector is a boolean expression evaluated against a message's attributes
and, through functions, its opaque payload. A message is selected only when
the selector evaluates to TRUE; FALSE and unknown (NULL) both reject it.

DOCUMENTATION CATEGORIES

  syntax       Literals, identifiers, and comments on case and quoting
  operators    Comparison, logical, arithmetic, BETWEEN, IN, LIKE, IS NULL
  functions    json(path) and parse(protocol, path) payload access
  models       Machine-learning model functions (pca, kmeans, naivebayes)

QUICK REFERENCE

  price > 100 AND region IN ('EU', 'UK')
  name LIKE 'ord\_%' ESCAPE '\'
  json('order.items.0.sku') = 'A-1'
  parse(protocol, 'order.total') BETWEEN 10 AND 20

Run 'selector doc <category>' for detailed documentation.
"#
}

/// Get documentation for a specific category
pub fn get_doc_category(name: &str) -> Result<&'static str, CliError> {
    match DocCategory::from_name(name) {
        Some(DocCategory::Syntax) => Ok(SYNTAX_DOC),
        Some(DocCategory::Operators) => Ok(OPERATORS_DOC),
        Some(DocCategory::Functions) => Ok(FUNCTIONS_DOC),
        Some(DocCategory::Models) => Ok(MODELS_DOC),
        None => Err(CliError::UnknownCategory(name.to_string())),
    }
}

const SYNTAX_DOC: &str = r#"SYNTAX - Literals and Identifiers

STRING LITERALS
  'text'
    Single-quoted. A quote inside the literal is doubled.

    Example:
      owner = 'O''Brien'

NUMERIC LITERALS
  42  -7  3.14  1.5e3
    Whole numbers are 64-bit integers; anything with a fraction or exponent
    is a double. A whole number too large for 64 bits becomes a double.

BOOLEAN AND NULL
  TRUE  FALSE  NULL
    Keywords are case-insensitive.

IDENTIFIERS
  priority  order.region  $type  CO₂
    Start with a letter, '_' or '$'; continue with letters, digits, '_',
    '$' or '.'. Identifiers are case-sensitive and name message attributes.
    An attribute the message does not carry evaluates to NULL.
"#;

const OPERATORS_DOC: &str = r#"OPERATORS - Precedence from loosest to tightest

LOGICAL
  OR   AND   NOT
    Three-valued: NULL means unknown.
      FALSE AND NULL  -> FALSE
      TRUE  AND NULL  -> NULL
      TRUE  OR  NULL  -> TRUE
      NOT (NULL)      -> FALSE

COMPARISON
  =  <>  <  >  <=  >=
    Numbers compare across integer and double. Strings and booleans compare
    with their own kind only. A comparison with NULL or mismatched types is
    FALSE.

RANGE AND MEMBERSHIP
  x [NOT] BETWEEN low AND high
  x [NOT] IN ('a', 'b', 3)
  x [NOT] LIKE 'pat%' [ESCAPE '!']
  x IS [NOT] NULL
    LIKE matches the whole string: '%' is any run, '_' any single character.

ARITHMETIC
  +  -  *  /  unary -
    Integer results that overflow become doubles. Integer division by zero
    is NULL.
"#;

const FUNCTIONS_DOC: &str = r#"FUNCTIONS - Payload Access

JSON PATH
  json('path')
    Decodes the message payload as JSON and walks the dotted path. Numeric
    segments index arrays. Missing paths, non-scalar nodes, and payloads
    that are not JSON all yield NULL.

    Example:
      Payload:  {"arrayData": [{"bill": 40}, {"bill": 60}]}
      Selector: json('arrayData.1.bill') = 60

    The payload may also use the relaxed form {name:'x'; total=3}.

PROTOCOL DISPATCH
  parse('json', 'path')
    Same as json('path'), chosen by name.

  parse(protocol, 'path')
    Resolves the protocol from the message attribute at evaluation time.
    An unknown protocol makes the call evaluate to FALSE.
"#;

const MODELS_DOC: &str = r#"MODELS - Machine-Learning Functions

  model_exists(name)
    TRUE when the model store can load the named model.

  pca(applypca[i], model, feature, ...)
  pca(explainedvariance[i], model, feature, ...)
  kmeans(distance[i], model, feature, ...)
  naivebayes(classifyprob[i], model, feature, ...)
    Loads the model and applies the tagged operation to the listed
    features. Features the message does not carry are passed as NaN.

    Example:
      pca(applypca[2], scd41.arff, CO₂, temperature, humidity) < 1
        OR NOT model_exists(scd41.arff)
"#;
