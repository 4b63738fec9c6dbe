use super::*;

/// Destination to next-hop table, for fixed deployments and tests.
///
/// Lookup tries an exact destination match, then the longest configured
/// prefix, and finally falls back to the first active neighbor.
#[derive(Debug, Default, Clone)]
pub struct StaticRouter {
    routes: Vec<(String, String)>,
}

impl StaticRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_routes<I, D, N>(routes: I) -> Self
    where
        I: IntoIterator<Item = (D, N)>,
        D: Into<String>,
        N: Into<String>,
    {
        let mut router = Self::new();
        for (destination, next_hop) in routes {
            router.add_route(destination, next_hop);
        }
        router
    }

    /// Adds or replaces the route for `destination`.
    pub fn add_route(&mut self, destination: impl Into<String>, next_hop: impl Into<String>) {
        let destination = destination.into();
        let next_hop = next_hop.into();
        if let Some(route) = self.routes.iter_mut().find(|(d, _)| *d == destination) {
            route.1 = next_hop;
        } else {
            self.routes.push((destination, next_hop));
        }
    }

    fn usable<'a>(neighbors: &'a [Neighbor], id: &str) -> Option<&'a Neighbor> {
        neighbors.iter().find(|n| n.active && n.id == id)
    }
}

impl Router for StaticRouter {
    fn select_next_hop(&self, bundle: &bundle::Bundle, neighbors: &[Neighbor]) -> Result<String> {
        let destination = bundle.destination();

        if let Some((_, hop)) = self.routes.iter().find(|(d, _)| d == destination)
            && let Some(n) = Self::usable(neighbors, hop)
        {
            return Ok(n.id.clone());
        }

        let mut prefixes = self
            .routes
            .iter()
            .filter(|(d, _)| destination.starts_with(d.as_str()))
            .collect::<Vec<_>>();
        prefixes.sort_by_key(|(d, _)| std::cmp::Reverse(d.len()));
        for (_, hop) in prefixes {
            if let Some(n) = Self::usable(neighbors, hop) {
                return Ok(n.id.clone());
            }
        }

        neighbors
            .iter()
            .find(|n| n.active)
            .map(|n| n.id.clone())
            .ok_or_else(|| no_route(bundle))
    }
}
