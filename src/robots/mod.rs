//! Robots.txt rules so the crawler honors site crawl policy
//!
//! Covers user-agent block selection and Allow/Disallow longest-match
//! precedence with `*` interior wildcards and `$` end anchors. Not an
//! RFC-complete parser; directives outside that subset are ignored.

mod cache;

pub use cache::RobotsPolicyCache;

/// Parsed Allow/Disallow rules for one host, as seen by one user agent
#[derive(Debug, Clone, Default)]
pub struct RobotsRules {
    allow: Vec<String>,
    disallow: Vec<String>,
}

impl RobotsRules {
    /// Rules that allow every path
    ///
    /// Used when robots.txt is absent, unreachable, or empty for our agent.
    pub fn allow_all() -> Self {
        Self::default()
    }

    /// Parse robots.txt content, selecting the rule block for `user_agent`
    ///
    /// Blocks naming the agent specifically win over the `*` wildcard block;
    /// with neither present the result allows everything.
    pub fn parse(content: &str, user_agent: &str) -> Self {
        let blocks = parse_blocks(content);
        let agent_lower = user_agent.to_ascii_lowercase();

        let specific: Vec<&Block> = blocks
            .iter()
            .filter(|b| {
                b.agents
                    .iter()
                    .any(|a| a != "*" && agent_lower.contains(a.as_str()))
            })
            .collect();

        let selected: Vec<&Block> = if !specific.is_empty() {
            specific
        } else {
            blocks
                .iter()
                .filter(|b| b.agents.iter().any(|a| a == "*"))
                .collect()
        };

        let mut rules = RobotsRules::default();
        for block in selected {
            rules.allow.extend(block.allow.iter().cloned());
            rules.disallow.extend(block.disallow.iter().cloned());
        }
        rules
    }

    /// Whether the given path (plus query) may be fetched
    ///
    /// Longest matching pattern wins; a tie between Allow and Disallow
    /// favors Allow.
    pub fn is_allowed(&self, path_and_query: &str) -> bool {
        let longest_allow = longest_match(&self.allow, path_and_query);
        let longest_disallow = longest_match(&self.disallow, path_and_query);
        longest_disallow <= longest_allow
    }
}

/// One user-agent block in a robots.txt file
#[derive(Debug, Default)]
struct Block {
    agents: Vec<String>,
    allow: Vec<String>,
    disallow: Vec<String>,
}

fn parse_blocks(content: &str) -> Vec<Block> {
    let mut blocks: Vec<Block> = Vec::new();
    let mut current: Option<Block> = None;
    // consecutive user-agent lines share one block; the first rule line
    // after them closes the agent list
    let mut accepting_agents = false;

    for line in content.lines() {
        let line = line.split('#').next().unwrap_or("").trim();
        if line.is_empty() {
            continue;
        }
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim();

        match key.as_str() {
            "user-agent" => {
                if !accepting_agents {
                    if let Some(block) = current.take() {
                        blocks.push(block);
                    }
                    current = Some(Block::default());
                    accepting_agents = true;
                }
                if let Some(block) = current.as_mut() {
                    block.agents.push(value.to_ascii_lowercase());
                }
            }
            "allow" => {
                accepting_agents = false;
                if let (Some(block), false) = (current.as_mut(), value.is_empty()) {
                    block.allow.push(value.to_string());
                }
            }
            "disallow" => {
                accepting_agents = false;
                // an empty Disallow means "allow everything"; recording
                // nothing gives the same outcome
                if let (Some(block), false) = (current.as_mut(), value.is_empty()) {
                    block.disallow.push(value.to_string());
                }
            }
            _ => {}
        }
    }
    if let Some(block) = current.take() {
        blocks.push(block);
    }
    blocks
}

/// Length of the longest pattern matching `path`, 0 when none match
fn longest_match(patterns: &[String], path: &str) -> usize {
    patterns
        .iter()
        .filter(|p| pattern_matches(p, path))
        .map(|p| p.len())
        .max()
        .unwrap_or(0)
}

/// Match a robots pattern against a path
///
/// Literal prefix match, `*` matches any run of characters, a trailing `$`
/// anchors the pattern to the end of the path.
fn pattern_matches(pattern: &str, path: &str) -> bool {
    let (body, anchored) = match pattern.strip_suffix('$') {
        Some(body) => (body, true),
        None => (pattern, false),
    };

    let mut segments = body.split('*');
    let first = segments.next().unwrap_or("");
    if !path.starts_with(first) {
        return false;
    }
    let mut pos = first.len();

    let rest: Vec<&str> = segments.collect();
    if rest.is_empty() {
        // no wildcards: prefix match, or exact match when anchored
        return !anchored || path.len() == pos;
    }

    for (i, segment) in rest.iter().enumerate() {
        let last = i == rest.len() - 1;
        if last && anchored {
            return path.len() >= pos + segment.len() && path.ends_with(segment);
        }
        match path[pos..].find(segment) {
            Some(offset) => pos += offset + segment.len(),
            None => return false,
        }
    }
    true
}
