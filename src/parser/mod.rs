pub mod frontmatter;

pub use frontmatter::{extract_yaml_frontmatter, parse_from_markdown};
