/// One published value: its telemetry field name and its Prometheus name.
#[derive(Debug, Clone, Copy)]
pub struct Tag {
    pub key: &'static str,
    pub metric: &'static str,
}

pub const ENABLE_STATE: Tag = Tag {
    key: "enable_state",
    metric: "conveyor_enabled",
};

pub const RUN_STATE: Tag = Tag {
    key: "run_state",
    metric: "conveyor_running",
};

pub const STEP: Tag = Tag {
    key: "step",
    metric: "conveyor_step",
};

pub const VOLTAGE_FAULT: Tag = Tag {
    key: "voltage_fault",
    metric: "conveyor_voltage_fault",
};

pub const CURRENT_FAULT: Tag = Tag {
    key: "current_fault",
    metric: "conveyor_current_fault",
};

pub const TEMPERATURE_FAULT: Tag = Tag {
    key: "temperature_fault",
    metric: "conveyor_temperature_fault",
};

pub const VIBRATION_FAULT: Tag = Tag {
    key: "vibration_fault",
    metric: "conveyor_vibration_fault",
};

pub const SUPPLY_VOLTAGE: Tag = Tag {
    key: "supply_voltage",
    metric: "conveyor_supply_voltage_volts",
};

pub const SUPPLY_CURRENT: Tag = Tag {
    key: "supply_current",
    metric: "conveyor_supply_current_amps",
};

pub const MOTOR_TEMPERATURE: Tag = Tag {
    key: "motor_temperature",
    metric: "conveyor_motor_temperature_celsius",
};

pub const MOTOR_VIBRATION: Tag = Tag {
    key: "motor_vibration",
    metric: "conveyor_motor_vibration",
};

pub const STATE_TAGS: &[Tag] = &[
    ENABLE_STATE,
    RUN_STATE,
    STEP,
    VOLTAGE_FAULT,
    CURRENT_FAULT,
    TEMPERATURE_FAULT,
    VIBRATION_FAULT,
];

pub const SENSOR_TAGS: &[Tag] = &[SUPPLY_VOLTAGE, SUPPLY_CURRENT, MOTOR_TEMPERATURE, MOTOR_VIBRATION];
