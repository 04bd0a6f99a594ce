//! Request bodies for control integration tests.

use serde_json::{json, Value};

/// Builder for `POST /nodes` bodies.
pub struct NodeBuilder {
    name: String,
    location: String,
    serial: String,
    address: String,
}

impl NodeBuilder {
    /// Creates a node builder with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            location: "lab".to_string(),
            serial: format!("SN-{name}"),
            address: "10.0.0.1:42101".to_string(),
        }
    }

    /// Sets the agent address.
    pub fn with_address(mut self, address: &str) -> Self {
        self.address = address.to_string();
        self
    }

    /// Sets the location.
    pub fn with_location(mut self, location: &str) -> Self {
        self.location = location.to_string();
        self
    }

    /// Sets the serial.
    pub fn with_serial(mut self, serial: &str) -> Self {
        self.serial = serial.to_string();
        self
    }

    /// Builds the request body.
    pub fn build(self) -> Value {
        json!({
            "name": self.name,
            "location": self.location,
            "serial": self.serial,
            "address": self.address,
        })
    }
}

/// Builder for `POST /apps` bodies.
pub struct AppBuilder {
    app_type: String,
    name: String,
    cores: u32,
    memory: u32,
    ports: Vec<Value>,
}

impl AppBuilder {
    /// Creates a container app builder with the given name.
    pub fn new(name: &str) -> Self {
        Self {
            app_type: "container".to_string(),
            name: name.to_string(),
            cores: 1,
            memory: 128,
            ports: vec![],
        }
    }

    /// Makes this a VM app.
    pub fn vm(mut self) -> Self {
        self.app_type = "vm".to_string();
        self
    }

    /// Sets the requested cores.
    pub fn with_cores(mut self, cores: u32) -> Self {
        self.cores = cores;
        self
    }

    /// Adds an exposed port.
    pub fn with_port(mut self, port: u32, protocol: &str) -> Self {
        self.ports.push(json!({"port": port, "protocol": protocol}));
        self
    }

    /// Builds the request body.
    pub fn build(self) -> Value {
        json!({
            "type": self.app_type,
            "name": self.name,
            "vendor": "acme",
            "description": "test app",
            "version": "1.0.0",
            "cores": self.cores,
            "memory": self.memory,
            "ports": self.ports,
            "source": format!("https://images.example.com/{}.tar.gz", self.name),
        })
    }
}

/// A `POST /traffic_policies` body with a single accept rule.
pub fn traffic_policy(name: &str) -> Value {
    json!({
        "name": name,
        "rules": [{
            "description": "allow local",
            "priority": 1,
            "action": "accept",
            "protocol": "tcp",
            "source": "192.168.0.0/16",
        }],
    })
}

/// A `POST /dns_configs` body with one record and one forwarder.
pub fn dns_config(name: &str) -> Value {
    json!({
        "name": name,
        "a_records": [{
            "name": "app.edge.local",
            "description": "local app",
            "ips": ["10.16.0.10"],
        }],
        "forwarders": [{
            "name": "upstream",
            "description": "public resolver",
            "ip": "1.1.1.1",
        }],
    })
}

/// A `POST /nodes_apps` body.
pub fn node_app(node_id: &str, app_id: &str) -> Value {
    json!({"node_id": node_id, "app_id": app_id})
}

/// A `POST /nodes_apps_traffic_policies` body.
pub fn node_app_traffic_policy(nodes_apps_id: &str, traffic_policy_id: &str) -> Value {
    json!({"nodes_apps_id": nodes_apps_id, "traffic_policy_id": traffic_policy_id})
}

/// A `POST /nodes_dns_configs` body.
pub fn node_dns_config(node_id: &str, dns_config_id: &str) -> Value {
    json!({"node_id": node_id, "dns_config_id": dns_config_id})
}
