use super::{parse_duration, Config};
use crate::context::ClientMetadata;
use crate::error::{Error, Result};
use std::collections::HashSet;

impl Config {
    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if let Some(ref id) = self.client_id {
            ClientMetadata::validate_id(id)?;
        }

        if let Some(ref host) = self.host {
            if host.trim().is_empty() {
                return Err(Error::Validation("'host' must not be empty".to_string()));
            }
        }

        for (field, value) in [
            ("startup_timeout", &self.startup_timeout),
            ("startup_grace", &self.startup_grace),
        ] {
            if let Some(ref v) = value {
                parse_duration(v).map_err(|_| {
                    Error::Validation(format!(
                        "Invalid {} '{}'. Use formats like '5s', '30s', '1m', '500ms'",
                        field, v
                    ))
                })?;
            }
        }

        for (name, service) in &self.services {
            if service.command.trim().is_empty() {
                return Err(Error::Validation(format!(
                    "Service '{}' has an empty command",
                    name
                )));
            }

            if service.ports.contains(&0) {
                return Err(Error::Validation(format!(
                    "Service '{}' declares port 0",
                    name
                )));
            }

            if let Some(ref t) = service.startup_timeout {
                parse_duration(t).map_err(|_| {
                    Error::Validation(format!(
                        "Service '{}' has invalid startup_timeout '{}'. Use formats like '5s', '30s', '1m', '500ms'",
                        name, t
                    ))
                })?;
            }

            for dep in &service.depends_on {
                if dep == name {
                    return Err(Error::Validation(format!(
                        "Service '{}' depends on itself",
                        name
                    )));
                }
                if !self.services.contains_key(dep) {
                    return Err(Error::Validation(format!(
                        "Service '{}' depends on non-existent service '{}'",
                        name, dep
                    )));
                }
            }
        }

        self.check_circular_dependencies()
    }

    fn check_circular_dependencies(&self) -> Result<()> {
        let mut visited = HashSet::new();
        let mut rec_stack = HashSet::new();
        let mut path = Vec::new();

        for service_name in self.services.keys() {
            if !visited.contains(service_name) {
                if let Some(cycle) =
                    self.find_cycle(service_name, &mut visited, &mut rec_stack, &mut path)
                {
                    return Err(Error::CircularDependency(cycle));
                }
            }
        }

        Ok(())
    }

    fn find_cycle(
        &self,
        service: &str,
        visited: &mut HashSet<String>,
        rec_stack: &mut HashSet<String>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        visited.insert(service.to_string());
        rec_stack.insert(service.to_string());
        path.push(service.to_string());

        if let Some(svc) = self.services.get(service) {
            for dep in &svc.depends_on {
                if !visited.contains(dep) {
                    if let Some(cycle) = self.find_cycle(dep, visited, rec_stack, path) {
                        return Some(cycle);
                    }
                } else if rec_stack.contains(dep) {
                    let cycle_start = path.iter().position(|n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<String> = path[cycle_start..].to_vec();
                    cycle.push(dep.to_string());
                    return Some(cycle);
                }
            }
        }

        rec_stack.remove(service);
        path.pop();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;

    fn service(deps: &[&str]) -> ServiceConfig {
        ServiceConfig {
            command: "true".to_string(),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_config() {
        let mut config = Config::default();
        config.client_id = Some("ci".to_string());
        config.startup_timeout = Some("30s".to_string());
        config.services.insert("app".to_string(), service(&["db"]));
        config.services.insert("db".to_string(), service(&[]));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_circular_dependency() {
        let mut config = Config::default();
        config.services.insert("a".to_string(), service(&["b"]));
        config.services.insert("b".to_string(), service(&["a"]));

        assert!(matches!(
            config.validate(),
            Err(Error::CircularDependency(_))
        ));
    }

    #[test]
    fn test_circular_dependency_error_shows_cycle_path() {
        let mut config = Config::default();
        config.services.insert("x".to_string(), service(&["y"]));
        config.services.insert("y".to_string(), service(&["z"]));
        config.services.insert("z".to_string(), service(&["x"]));

        let error_msg = config.validate().unwrap_err().to_string();
        assert!(
            error_msg.contains("x -> y -> z -> x"),
            "Error should show cycle path with arrows, got: {}",
            error_msg
        );
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut config = Config::default();
        config.services.insert("a".to_string(), service(&["a"]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("depends on itself"));
    }

    #[test]
    fn test_missing_dependency_rejected() {
        let mut config = Config::default();
        config.services.insert("a".to_string(), service(&["ghost"]));
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("non-existent service 'ghost'"));
    }

    #[test]
    fn test_empty_command_rejected() {
        let mut config = Config::default();
        let mut svc = service(&[]);
        svc.command = "  ".to_string();
        config.services.insert("a".to_string(), svc);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_port_zero_rejected() {
        let mut config = Config::default();
        let mut svc = service(&[]);
        svc.ports = vec![8080, 0];
        config.services.insert("a".to_string(), svc);
        assert!(matches!(config.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn test_invalid_durations_rejected() {
        let mut config = Config::default();
        config.startup_grace = Some("soon".to_string());
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_grace"));

        let mut config = Config::default();
        let mut svc = service(&[]);
        svc.startup_timeout = Some("10 minutes".to_string());
        config.services.insert("a".to_string(), svc);
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("startup_timeout"));
    }

    #[test]
    fn test_invalid_client_id_rejected() {
        let mut config = Config::default();
        config.client_id = Some("has space".to_string());
        assert!(matches!(
            config.validate(),
            Err(Error::InvalidClientId { .. })
        ));
    }
}
