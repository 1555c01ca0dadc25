//! Session settings and variables read by the rewriter.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono_tz::Tz;
use parking_lot::RwLock;
use tessera_error::{DbError, ErrorKind, Result};
use tessera_types::Datum;

/// Configuration for the session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub allow_in_subquery_to_join_and_agg: bool,
    pub time_zone: Tz,
    pub use_plan_cache: bool,
    pub current_db: String,
    /// Values bound to `?` markers for the statement being planned.
    pub prepared_params: Vec<Datum>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            allow_in_subquery_to_join_and_agg: true,
            time_zone: Tz::UTC,
            use_plan_cache: false,
            current_db: String::new(),
            prepared_params: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn set_from_datum(&mut self, name: &str, value: &Datum) -> Result<()> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        (func.set)(value, self)
    }

    pub fn get_as_datum(&self, name: &str) -> Result<Datum> {
        let func = GET_SET_FUNCTIONS
            .get(name)
            .ok_or_else(|| DbError::new(format!("Missing setting for '{name}'")))?;

        Ok((func.get)(self))
    }

    pub fn reset(&mut self, name: &str) -> Result<()> {
        let def_conf = Self::default();
        let value = def_conf.get_as_datum(name)?;
        self.set_from_datum(name, &value)
    }
}

struct SettingFunctions {
    set: fn(value: &Datum, conf: &mut SessionConfig) -> Result<()>,
    get: fn(conf: &SessionConfig) -> Datum,
}

impl SettingFunctions {
    const fn new<S: SessionSetting>() -> Self {
        SettingFunctions {
            set: S::set_from_datum as _,
            get: S::get_as_datum as _,
        }
    }
}

fn insert_setting<S: SessionSetting>(map: &mut HashMap<&'static str, SettingFunctions>) {
    if map.insert(S::NAME, SettingFunctions::new::<S>()).is_some() {
        panic!("Duplicate settings names: {}", S::NAME);
    }
}

static GET_SET_FUNCTIONS: LazyLock<HashMap<&'static str, SettingFunctions>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    insert_setting::<AllowInSubqueryToJoinAndAgg>(&mut map);
    insert_setting::<TimeZone>(&mut map);
    insert_setting::<UsePlanCache>(&mut map);
    insert_setting::<CurrentDb>(&mut map);

    map
});

pub trait SessionSetting: Sync + Send + 'static {
    const NAME: &'static str;
    const DESCRIPTION: &'static str;

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()>;
    fn get_as_datum(conf: &SessionConfig) -> Datum;
}

fn datum_as_bool(value: &Datum) -> Result<bool> {
    if let Datum::String(s) = value {
        return match s.to_ascii_lowercase().as_str() {
            "on" | "true" => Ok(true),
            "off" | "false" => Ok(false),
            _ => Err(DbError::new(format!("Invalid boolean value '{s}'"))),
        };
    }
    value
        .to_bool()?
        .ok_or_else(|| DbError::new("Setting cannot be NULL"))
}

fn datum_as_string(value: &Datum) -> Result<String> {
    match value {
        Datum::String(s) => Ok(s.clone()),
        Datum::Bytes(b) => Ok(String::from_utf8_lossy(b).into_owned()),
        Datum::Null => Err(DbError::new("Setting cannot be NULL")),
        other => Ok(other.to_string()),
    }
}

pub struct AllowInSubqueryToJoinAndAgg;

impl SessionSetting for AllowInSubqueryToJoinAndAgg {
    const NAME: &'static str = "allow_in_subquery_to_join_and_agg";
    const DESCRIPTION: &'static str =
        "Rewrite uncorrelated IN subqueries to a join against the distinct subquery output";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        conf.allow_in_subquery_to_join_and_agg = datum_as_bool(value)?;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        Datum::Int64(conf.allow_in_subquery_to_join_and_agg as i64)
    }
}

pub struct TimeZone;

impl SessionSetting for TimeZone {
    const NAME: &'static str = "time_zone";
    const DESCRIPTION: &'static str = "Time zone used for timestamps and current time functions";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        let name = datum_as_string(value)?;
        conf.time_zone = Tz::from_str(&name)
            .map_err(|e| DbError::new(format!("Unknown or incorrect time zone: '{name}'")).with_field("error", e))?;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        Datum::String(conf.time_zone.name().to_string())
    }
}

pub struct UsePlanCache;

impl SessionSetting for UsePlanCache {
    const NAME: &'static str = "use_plan_cache";
    const DESCRIPTION: &'static str =
        "Keep per-execution functions like NOW() unevaluated so plans can be reused";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        conf.use_plan_cache = datum_as_bool(value)?;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        Datum::Int64(conf.use_plan_cache as i64)
    }
}

pub struct CurrentDb;

impl SessionSetting for CurrentDb {
    const NAME: &'static str = "current_db";
    const DESCRIPTION: &'static str = "Database used for unqualified table names";

    fn set_from_datum(value: &Datum, conf: &mut SessionConfig) -> Result<()> {
        conf.current_db = datum_as_string(value)?;
        Ok(())
    }

    fn get_as_datum(conf: &SessionConfig) -> Datum {
        Datum::String(conf.current_db.clone())
    }
}

/// Where a system variable can be read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarScope {
    Global,
    Session,
    Both,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SystemVariable {
    pub name: String,
    pub scope: VarScope,
    pub global_value: Datum,
    /// Session override. Falls back to the global value when unset.
    pub session_value: Option<Datum>,
}

impl SystemVariable {
    /// Read the variable for `@@global.name` (`global`) or `@@name`.
    ///
    /// `explicit` is set when the scope was written out, which makes reading
    /// a global-only variable through `@@session.` an error.
    pub fn value(&self, global: bool, explicit: bool) -> Result<Datum> {
        match (self.scope, global) {
            (VarScope::Session, true) => Err(DbError::with_kind(
                ErrorKind::UnknownSystemVariable,
                format!(
                    "Variable '{}' is a SESSION variable and can't be used with SET GLOBAL",
                    self.name
                ),
            )),
            (VarScope::Global, false) if explicit => Err(DbError::with_kind(
                ErrorKind::UnknownSystemVariable,
                format!("Variable '{}' is a GLOBAL variable", self.name),
            )),
            (_, true) | (VarScope::Global, false) => Ok(self.global_value.clone()),
            (_, false) => Ok(self
                .session_value
                .clone()
                .unwrap_or_else(|| self.global_value.clone())),
        }
    }
}

/// User (`@v`) and system (`@@v`) variables.
///
/// Methods take `&self`. Implementations use interior mutability so an
/// expression evaluating `@v := ...` doesn't need exclusive access.
pub trait SystemVariables: fmt::Debug + Send + Sync {
    fn user_var(&self, name: &str) -> Option<Datum>;
    fn set_user_var(&self, name: &str, value: Datum);
    fn system_var(&self, name: &str) -> Option<SystemVariable>;
}

#[derive(Debug)]
pub struct InMemoryVariables {
    user: RwLock<HashMap<String, Datum>>,
    system: RwLock<HashMap<String, SystemVariable>>,
}

impl Default for InMemoryVariables {
    fn default() -> Self {
        let vars = InMemoryVariables {
            user: RwLock::new(HashMap::new()),
            system: RwLock::new(HashMap::new()),
        };
        vars.define("autocommit", VarScope::Both, Datum::Int64(1));
        vars.define("sql_mode", VarScope::Both, Datum::from("STRICT_TRANS_TABLES"));
        vars.define("time_zone", VarScope::Both, Datum::from("SYSTEM"));
        vars.define("transaction_isolation", VarScope::Both, Datum::from("REPEATABLE-READ"));
        vars.define("max_allowed_packet", VarScope::Both, Datum::Int64(67_108_864));
        vars.define("version", VarScope::Global, Datum::from(env!("CARGO_PKG_VERSION")));
        vars.define("warning_count", VarScope::Session, Datum::Int64(0));
        vars
    }
}

impl InMemoryVariables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a system variable definition.
    pub fn define(&self, name: &str, scope: VarScope, value: Datum) {
        let name = name.to_ascii_lowercase();
        self.system.write().insert(
            name.clone(),
            SystemVariable {
                name,
                scope,
                global_value: value,
                session_value: None,
            },
        );
    }

    pub fn set_session_var(&self, name: &str, value: Datum) -> Result<()> {
        let mut system = self.system.write();
        let var = system.get_mut(&name.to_ascii_lowercase()).ok_or_else(|| {
            DbError::with_kind(
                ErrorKind::UnknownSystemVariable,
                format!("Unknown system variable '{name}'"),
            )
        })?;
        if var.scope == VarScope::Global {
            return Err(DbError::new(format!(
                "Variable '{name}' is a GLOBAL variable and should be set with SET GLOBAL"
            )));
        }
        var.session_value = Some(value);
        Ok(())
    }
}

impl SystemVariables for InMemoryVariables {
    fn user_var(&self, name: &str) -> Option<Datum> {
        self.user.read().get(&name.to_ascii_lowercase()).cloned()
    }

    fn set_user_var(&self, name: &str, value: Datum) {
        self.user.write().insert(name.to_ascii_lowercase(), value);
    }

    fn system_var(&self, name: &str) -> Option<SystemVariable> {
        self.system.read().get(&name.to_ascii_lowercase()).cloned()
    }
}
