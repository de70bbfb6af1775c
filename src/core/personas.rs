use anyhow::{Result, anyhow, bail};

use crate::config::PersonaEntry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersonaRole {
    Coordinator,
    Specialist,
}

impl PersonaRole {
    fn parse(s: &str) -> Result<Self> {
        match s {
            "coordinator" => Ok(Self::Coordinator),
            "specialist" => Ok(Self::Specialist),
            other => Err(anyhow!("unknown persona role: {other}")),
        }
    }
}

/// A configured identity bound to a hosted assistant definition.
/// Immutable after load.
#[derive(Debug, Clone)]
pub struct Persona {
    pub key: String,
    pub assistant_id: String,
    pub name: String,
    pub role: PersonaRole,
    pub description: String,
}

/// The full persona roster. Exactly one coordinator, unique keys.
#[derive(Debug, Clone)]
pub struct PersonaRegistry {
    personas: Vec<Persona>,
    coordinator_idx: usize,
}

impl PersonaRegistry {
    pub fn from_entries(entries: &[PersonaEntry]) -> Result<Self> {
        let mut personas = Vec::with_capacity(entries.len());
        for entry in entries {
            if personas.iter().any(|p: &Persona| p.key == entry.key) {
                bail!("duplicate persona key: {}", entry.key);
            }
            personas.push(Persona {
                key: entry.key.clone(),
                assistant_id: entry.assistant_id.clone(),
                name: entry.name.clone(),
                role: PersonaRole::parse(&entry.role)?,
                description: entry.description.clone(),
            });
        }

        let coordinators: Vec<usize> = personas
            .iter()
            .enumerate()
            .filter(|(_, p)| p.role == PersonaRole::Coordinator)
            .map(|(i, _)| i)
            .collect();
        let coordinator_idx = match coordinators.as_slice() {
            [idx] => *idx,
            [] => bail!("persona config must declare a coordinator"),
            _ => bail!("persona config must declare exactly one coordinator"),
        };

        Ok(Self {
            personas,
            coordinator_idx,
        })
    }

    pub fn get(&self, key: &str) -> Option<&Persona> {
        self.personas.iter().find(|p| p.key == key)
    }

    pub fn coordinator(&self) -> &Persona {
        &self.personas[self.coordinator_idx]
    }

    pub fn specialists(&self) -> impl Iterator<Item = &Persona> {
        self.personas
            .iter()
            .filter(|p| p.role == PersonaRole::Specialist)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Persona> {
        self.personas.iter()
    }
}

#[cfg(test)]
pub(crate) mod testutil {
    use crate::config::PersonaEntry;

    pub fn entry(key: &str, role: &str) -> PersonaEntry {
        PersonaEntry {
            key: key.to_string(),
            assistant_id: format!("asst_{key}"),
            name: format!("pm-{key}"),
            role: role.to_string(),
            description: String::new(),
        }
    }

    pub fn roster() -> Vec<PersonaEntry> {
        vec![
            entry("chief_of_staff", "coordinator"),
            entry("lsrc_tech", "specialist"),
            entry("documentary", "specialist"),
        ]
    }
}
