//! TraCI protocol identifiers used by this client.

// Commands
pub const CMD_GETVERSION: u8 = 0x00;
pub const CMD_SIMSTEP: u8 = 0x02;
pub const CMD_CLOSE: u8 = 0x7f;
pub const CMD_GET_VEHICLE_VARIABLE: u8 = 0xa4;
pub const CMD_GET_EDGE_VARIABLE: u8 = 0xaa;
pub const CMD_GET_SIM_VARIABLE: u8 = 0xab;
pub const CMD_SET_VEHICLE_VARIABLE: u8 = 0xc4;
pub const CMD_SET_ROUTE_VARIABLE: u8 = 0xc6;
pub const CMD_SUBSCRIBE_VEHICLE_VARIABLE: u8 = 0xd4;

// Responses
pub const RESPONSE_GET_OFFSET: u8 = 0x10;
pub const RESPONSE_SUBSCRIBE_VEHICLE_VARIABLE: u8 = 0xe4;
pub const RESPONSE_SUBSCRIBE_FIRST_VARIABLE: u8 = 0xe0;
pub const RESPONSE_SUBSCRIBE_LAST_VARIABLE: u8 = 0xef;

// Result codes
pub const RTYPE_OK: u8 = 0x00;
pub const RTYPE_NOTIMPLEMENTED: u8 = 0x01;
pub const RTYPE_ERR: u8 = 0xff;

// Value types
pub const POSITION_2D: u8 = 0x01;
pub const POSITION_3D: u8 = 0x03;
pub const POSITION_ROADMAP: u8 = 0x04;
pub const TYPE_UBYTE: u8 = 0x07;
pub const TYPE_BYTE: u8 = 0x08;
pub const TYPE_INTEGER: u8 = 0x09;
pub const TYPE_DOUBLE: u8 = 0x0b;
pub const TYPE_STRING: u8 = 0x0c;
pub const TYPE_STRINGLIST: u8 = 0x0e;
pub const TYPE_COMPOUND: u8 = 0x0f;
pub const TYPE_DOUBLELIST: u8 = 0x10;
pub const TYPE_COLOR: u8 = 0x11;

// Variables
pub const TRACI_ID_LIST: u8 = 0x00;
pub const VAR_SPEED: u8 = 0x40;
pub const VAR_POSITION: u8 = 0x42;
pub const VAR_ROAD_ID: u8 = 0x50;
pub const VAR_ROUTE_ID: u8 = 0x53;
pub const VAR_ROUTE: u8 = 0x57;
pub const VAR_CO2EMISSION: u8 = 0x60;
pub const VAR_FUELCONSUMPTION: u8 = 0x65;
pub const VAR_TIME: u8 = 0x66;
pub const VAR_WAITING_TIME: u8 = 0x7a;
pub const VAR_DISTANCE: u8 = 0x84;
pub const VAR_PENDING_VEHICLES: u8 = 0x94;
pub const VAR_ACCUMULATED_WAITING_TIME: u8 = 0x87;

// Set/state commands
pub const ADD: u8 = 0x80;
pub const REMOVE: u8 = 0x81;
pub const DISTANCE_REQUEST: u8 = 0x83;
pub const ADD_FULL: u8 = 0x85;

pub const REQUEST_AIRDIST: u8 = 0x00;
pub const REQUEST_DRIVINGDIST: u8 = 0x01;

pub const REMOVE_VAPORIZED: i8 = 3;

/// Subscription interval bound meaning "unbounded".
pub const INVALID_DOUBLE_VALUE: f64 = -1_073_741_824.0;
