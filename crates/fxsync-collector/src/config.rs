//! 환경변수 기반 설정 모듈.
//!
//! 동기화 대상(통화쌍, 타임프레임, 스케줄)은 선택적인 TOML 파일에서 읽고
//! 나머지 실행 파라미터는 환경변수에서 읽습니다.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use fxsync_core::{build_work_units, default_pairs, CurrencyPair, Timeframe, WorkUnit};
use serde::Deserialize;

use crate::error::CollectorError;
use crate::modules::schedule::{default_schedules, TimeframeSchedule};
use crate::Result;

const DEFAULT_OANDA_API_URL: &str = "https://api-fxpractice.oanda.com";

/// 업스트림 공급자 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpstreamProvider {
    /// OANDA REST API
    Oanda,
    /// 트레이딩 터미널 (HTTP 게이트웨이)
    Terminal,
}

impl UpstreamProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpstreamProvider::Oanda => "oanda",
            UpstreamProvider::Terminal => "terminal",
        }
    }
}

impl FromStr for UpstreamProvider {
    type Err = CollectorError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "oanda" => Ok(UpstreamProvider::Oanda),
            "terminal" | "mt5" => Ok(UpstreamProvider::Terminal),
            other => Err(CollectorError::Config(format!(
                "알 수 없는 업스트림 공급자: {} (oanda | terminal)",
                other
            ))),
        }
    }
}

/// Collector 전체 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// 데이터베이스 URL
    pub database_url: String,
    /// 업스트림 공급자
    pub provider: UpstreamProvider,
    /// OANDA 설정
    pub oanda: OandaSettings,
    /// 터미널 게이트웨이 설정
    pub terminal: TerminalSettings,
    /// 동기화 설정
    pub sync: SyncConfig,
    /// 모니터링/알림 설정
    pub monitoring: MonitoringConfig,
    /// 동기화 대상
    pub universe: Universe,
}

/// OANDA 설정
#[derive(Clone)]
pub struct OandaSettings {
    /// API 주소 (practice/live)
    pub api_url: String,
    /// API 키 (OANDA 사용 시 필수)
    pub api_key: Option<String>,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
    /// 요청 간 딜레이 (밀리초)
    pub rate_limit_delay_ms: u64,
}

impl std::fmt::Debug for OandaSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OandaSettings")
            .field("api_url", &self.api_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "***"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rate_limit_delay_ms", &self.rate_limit_delay_ms)
            .finish()
    }
}

/// 터미널 게이트웨이 설정
#[derive(Debug, Clone)]
pub struct TerminalSettings {
    /// 게이트웨이 주소 (터미널 사용 시 필수)
    pub gateway_url: Option<String>,
    /// 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

/// 동기화 설정
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 고정 주기 모드의 사이클 간격 (초)
    pub update_interval_secs: u64,
    /// 병렬 처리 여부
    pub parallel: bool,
    /// 최대 동시 작업 수
    pub max_workers: usize,
    /// 병렬 모드 작업 시작 간격 (밀리초)
    pub stagger_ms: u64,
    /// 순차 모드 작업 간 딜레이 (밀리초)
    pub sequential_delay_ms: u64,
    /// 요청당 최대 캔들 수 (0이면 청크 크기만 적용)
    pub candles_per_fetch: u32,
    /// 워터마크가 없을 때 조회할 과거 시간 (시간)
    pub lookback_hours: i64,
    /// 업스트림 요청 타임아웃 (초)
    pub fetch_timeout_secs: u64,
    /// 데몬 시작 시 빈 작업 단위의 초기 다운로드 기간 (일, 0이면 비활성화)
    pub history_download_days: i64,
    /// 연속 실패 허용 사이클 수
    pub max_retries: u32,
    /// 재시도 기본 간격 (초)
    pub retry_interval_secs: u64,
    /// 백오프 배수 상한
    pub retry_backoff_cap: u32,
    /// 타임프레임 경계 기반 스케줄 사용 여부
    pub smart_schedule: bool,
    /// 경계 이후 실행 시각 (초)
    pub schedule_second: u32,
    /// 타임프레임 그룹 간 딜레이 (밀리초)
    pub group_delay_ms: u64,
}

/// 모니터링 설정
#[derive(Debug, Clone)]
pub struct MonitoringConfig {
    /// 상태 보고 주기 (초)
    pub heartbeat_interval_secs: u64,
    /// 사이클마다 알림 전송 여부
    pub notify_cycles: bool,
}

/// 동기화 대상 (통화쌍 × 타임프레임 + 스케줄).
#[derive(Debug, Clone)]
pub struct Universe {
    pub pairs: Vec<CurrencyPair>,
    pub timeframes: Vec<Timeframe>,
    pub schedules: Vec<TimeframeSchedule>,
}

impl Default for Universe {
    fn default() -> Self {
        Self {
            pairs: default_pairs(),
            timeframes: Universe::DEFAULT_TIMEFRAMES.to_vec(),
            schedules: default_schedules(),
        }
    }
}

/// TOML 파일 형식. 없는 섹션은 기본값 사용.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct UniverseFile {
    pairs: Option<Vec<CurrencyPair>>,
    timeframes: Option<Vec<String>>,
    schedules: BTreeMap<String, ScheduleEntry>,
}

#[derive(Debug, Deserialize)]
struct ScheduleEntry {
    #[serde(default = "default_true")]
    enabled: bool,
    interval_minutes: Option<u32>,
}

fn default_true() -> bool {
    true
}

impl Universe {
    /// 기본 활성 타임프레임 (M30 제외)
    pub const DEFAULT_TIMEFRAMES: [Timeframe; 5] = [
        Timeframe::M5,
        Timeframe::M15,
        Timeframe::H1,
        Timeframe::H4,
        Timeframe::D1,
    ];

    /// TOML 문자열에서 로드
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: UniverseFile = toml::from_str(content)
            .map_err(|e| CollectorError::Config(format!("유니버스 파일 파싱 실패: {}", e)))?;

        let mut universe = Universe::default();

        if let Some(pairs) = file.pairs {
            universe.pairs = pairs;
        }

        if let Some(names) = file.timeframes {
            universe.timeframes = parse_timeframes(&names)?;
        }

        for (name, entry) in file.schedules {
            let timeframe: Timeframe = name.parse().map_err(CollectorError::Config)?;
            match universe
                .schedules
                .iter_mut()
                .find(|s| s.timeframe == timeframe)
            {
                Some(schedule) => {
                    schedule.enabled = entry.enabled;
                    if let Some(interval) = entry.interval_minutes {
                        schedule.interval_minutes = interval;
                    }
                }
                None => universe.schedules.push(TimeframeSchedule {
                    timeframe,
                    interval_minutes: entry
                        .interval_minutes
                        .unwrap_or(timeframe.minutes() as u32),
                    enabled: entry.enabled,
                }),
            }
        }

        Ok(universe)
    }

    /// 파일에서 로드
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CollectorError::Config(format!(
                "유니버스 파일을 읽을 수 없습니다 ({}): {}",
                path.display(),
                e
            ))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn enabled_pairs(&self) -> impl Iterator<Item = &CurrencyPair> {
        self.pairs.iter().filter(|p| p.enabled)
    }

    /// 작업 단위 목록 (우선순위 순)
    pub fn work_units(&self, include_disabled: bool) -> Vec<WorkUnit> {
        build_work_units(&self.pairs, &self.timeframes, include_disabled)
    }
}

impl CollectorConfig {
    /// 환경변수에서 설정 로드
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let database_url = std::env::var("DATABASE_URL").map_err(|_| {
            CollectorError::Config("DATABASE_URL 환경변수가 설정되지 않았습니다".to_string())
        })?;

        let provider = match std::env::var("UPSTREAM_PROVIDER") {
            Ok(value) => value.parse()?,
            Err(_) => UpstreamProvider::Oanda,
        };

        let mut universe = match std::env::var("FXSYNC_UNIVERSE") {
            Ok(path) => Universe::load(Path::new(&path))?,
            Err(_) => Universe::default(),
        };
        // 타임프레임만 환경변수로 덮어쓰기 (예: "M5,M15")
        let timeframes = env_var_list("SYNC_TIMEFRAMES");
        if !timeframes.is_empty() {
            universe.timeframes = parse_timeframes(&timeframes)?;
        }

        Ok(Self {
            database_url,
            provider,
            oanda: OandaSettings {
                api_url: std::env::var("OANDA_API_URL")
                    .unwrap_or_else(|_| DEFAULT_OANDA_API_URL.to_string()),
                api_key: std::env::var("OANDA_API_KEY").ok().filter(|k| !k.is_empty()),
                request_timeout_secs: env_var_parse("OANDA_REQUEST_TIMEOUT_SECS", 30),
                rate_limit_delay_ms: env_var_parse("OANDA_RATE_LIMIT_DELAY_MS", 100),
            },
            terminal: TerminalSettings {
                gateway_url: std::env::var("TERMINAL_GATEWAY_URL")
                    .ok()
                    .filter(|u| !u.is_empty()),
                request_timeout_secs: env_var_parse("TERMINAL_REQUEST_TIMEOUT_SECS", 30),
            },
            sync: SyncConfig {
                update_interval_secs: env_var_parse("SYNC_UPDATE_INTERVAL_SECS", 60),
                parallel: env_var_bool("SYNC_PARALLEL", true),
                max_workers: env_var_parse("SYNC_MAX_WORKERS", 3),
                stagger_ms: env_var_parse("SYNC_STAGGER_MS", 200),
                sequential_delay_ms: env_var_parse("SYNC_SEQUENTIAL_DELAY_MS", 100),
                candles_per_fetch: env_var_parse("SYNC_CANDLES_PER_FETCH", 1000),
                lookback_hours: env_var_parse("SYNC_LOOKBACK_HOURS", 24),
                fetch_timeout_secs: env_var_parse("SYNC_FETCH_TIMEOUT_SECS", 30),
                history_download_days: env_var_parse("SYNC_HISTORY_DOWNLOAD_DAYS", 30),
                max_retries: env_var_parse("SYNC_MAX_RETRIES", 5),
                retry_interval_secs: env_var_parse("SYNC_RETRY_INTERVAL_SECS", 30),
                retry_backoff_cap: env_var_parse("SYNC_RETRY_BACKOFF_CAP", 5),
                smart_schedule: env_var_bool("SYNC_SMART_SCHEDULE", false),
                schedule_second: env_var_parse("SYNC_SCHEDULE_SECOND", 2),
                group_delay_ms: env_var_parse("SYNC_GROUP_DELAY_MS", 1000),
            },
            monitoring: MonitoringConfig {
                heartbeat_interval_secs: env_var_parse("HEARTBEAT_INTERVAL_SECS", 3600),
                notify_cycles: env_var_bool("NOTIFY_CYCLES", true),
            },
            universe,
        })
    }

    /// `--universe` 옵션으로 지정한 파일로 대상 교체
    pub fn with_universe_file(mut self, path: &Path) -> Result<Self> {
        self.universe = Universe::load(path)?;
        Ok(self)
    }

    /// 설정 검증. 사이클 시작 전에 호출합니다.
    pub fn validate(&self) -> Result<()> {
        if self.universe.enabled_pairs().next().is_none() {
            return Err(CollectorError::Config(
                "활성화된 통화쌍이 없습니다".to_string(),
            ));
        }
        if self.universe.timeframes.is_empty() {
            return Err(CollectorError::Config(
                "활성 타임프레임이 없습니다".to_string(),
            ));
        }
        if self.sync.max_workers == 0 {
            return Err(CollectorError::Config(
                "SYNC_MAX_WORKERS는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.sync.schedule_second > 59 {
            return Err(CollectorError::Config(format!(
                "SYNC_SCHEDULE_SECOND는 0~59 범위여야 합니다: {}",
                self.sync.schedule_second
            )));
        }
        if self.sync.max_retries == 0 {
            return Err(CollectorError::Config(
                "SYNC_MAX_RETRIES는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.sync.lookback_hours <= 0 {
            return Err(CollectorError::Config(format!(
                "SYNC_LOOKBACK_HOURS는 1 이상이어야 합니다: {}",
                self.sync.lookback_hours
            )));
        }

        for schedule in self.universe.schedules.iter().filter(|s| s.enabled) {
            if !schedule.has_valid_interval() {
                return Err(CollectorError::Config(format!(
                    "{} 스케줄 주기 {}분은 1시간 또는 하루를 나누어떨어지게 해야 합니다",
                    schedule.timeframe, schedule.interval_minutes
                )));
            }
        }

        // 경계 기반 모드에서 스케줄이 없는 타임프레임은 첫 사이클 이후 동기화되지 않음
        if self.sync.smart_schedule {
            for timeframe in &self.universe.timeframes {
                let scheduled = self
                    .universe
                    .schedules
                    .iter()
                    .any(|s| s.timeframe == *timeframe && s.enabled);
                if !scheduled {
                    return Err(CollectorError::Config(format!(
                        "{} 타임프레임의 스케줄이 없거나 비활성화되어 있습니다 (SYNC_SMART_SCHEDULE)",
                        timeframe
                    )));
                }
            }
        }

        let mut symbols = HashSet::new();
        let mut ids = HashSet::new();
        for pair in &self.universe.pairs {
            if !symbols.insert(pair.symbol.as_str()) {
                return Err(CollectorError::Config(format!(
                    "중복된 통화쌍 심볼: {}",
                    pair.symbol
                )));
            }
            if !ids.insert(pair.symbol_id) {
                return Err(CollectorError::Config(format!(
                    "중복된 symbol_id: {} ({})",
                    pair.symbol_id, pair.symbol
                )));
            }
        }

        Ok(())
    }
}

impl SyncConfig {
    /// 고정 주기 사이클 간격을 Duration으로 반환
    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_secs)
    }

    pub fn stagger(&self) -> Duration {
        Duration::from_millis(self.stagger_ms)
    }

    pub fn sequential_delay(&self) -> Duration {
        Duration::from_millis(self.sequential_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn group_delay(&self) -> Duration {
        Duration::from_millis(self.group_delay_ms)
    }

    /// 워터마크가 없을 때의 조회 범위
    pub fn lookback(&self) -> chrono::Duration {
        chrono::Duration::hours(self.lookback_hours)
    }
}

impl MonitoringConfig {
    /// 상태 보고 주기를 Duration으로 반환
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }
}

/// 타임프레임 이름 목록 파싱 (정렬, 중복 제거)
pub fn parse_timeframes(names: &[String]) -> Result<Vec<Timeframe>> {
    let mut timeframes = names
        .iter()
        .map(|name| name.parse::<Timeframe>().map_err(CollectorError::Config))
        .collect::<Result<Vec<_>>>()?;
    timeframes.sort();
    timeframes.dedup();
    Ok(timeframes)
}

/// 환경변수에서 값을 파싱 (실패 시 기본값 사용)
fn env_var_parse<T: FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// 환경변수에서 bool 값 파싱
fn env_var_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .map(|v| v == "true" || v == "1")
        .unwrap_or(default)
}

/// 환경변수에서 쉼표로 구분된 리스트 파싱
fn env_var_list(key: &str) -> Vec<String> {
    std::env::var(key)
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_uppercase())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}
